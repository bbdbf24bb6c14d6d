pub mod audio;
pub mod frame;
pub mod synthetic;

pub use audio::{AudioRecorder, AudioSource};
pub use frame::{encode_jpeg, EncodedFrame, FrameCapture, FrameSource, RawFrame};
pub use synthetic::{SyntheticCamera, SyntheticMicrophone};
