pub mod catalog;
pub mod controller;

pub use catalog::{Story, StoryCatalog};
pub use controller::{StoryController, StoryCursor, StoryProgressState};
