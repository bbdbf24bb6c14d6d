use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Story {
    pub ordinal_index: usize,
    pub title: String,
    pub body: String,
}

/// The passages shown during the reading phase, in order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryCatalog {
    stories: Vec<Story>,
}

impl StoryCatalog {
    /// Returns `None` for an empty list.
    pub fn new(passages: Vec<(String, String)>) -> Option<Self> {
        if passages.is_empty() {
            return None;
        }
        let stories = passages
            .into_iter()
            .enumerate()
            .map(|(ordinal_index, (title, body))| Story {
                ordinal_index,
                title,
                body,
            })
            .collect();
        Some(Self { stories })
    }

    /// The three fables every session reads.
    pub fn reference() -> Self {
        let passages = [
            (
                "The Tortoise and the Hare",
                "The hare and the tortoise ran a race.\n\
                 The hare dashed ahead but stopped to take a nap.\n\
                 The tortoise kept walking, slowly and steadily.\n\
                 In the end the tortoise crossed the line first!\n\
                 \"Slow and steady wins the race.\"",
            ),
            (
                "The Ant and the Grasshopper",
                "The ant worked hard all summer long.\n\
                 The grasshopper only sang songs in the sun.\n\
                 When winter came, the ant stayed warm at home.\n\
                 The grasshopper was cold and hungry.\n\
                 \"It pays to prepare ahead of time.\"",
            ),
            (
                "The Three Little Pigs",
                "Three little pigs each built a house.\n\
                 The first used straw and the second used sticks.\n\
                 The third built a strong house out of bricks.\n\
                 The wolf huffed and puffed, but only the brick house stood!\n\
                 \"Build things to last.\"",
            ),
        ];
        let stories = passages
            .into_iter()
            .enumerate()
            .map(|(ordinal_index, (title, body))| Story {
                ordinal_index,
                title: title.to_string(),
                body: body.to_string(),
            })
            .collect();
        Self { stories }
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, index: usize) -> Option<&Story> {
        self.stories.get(index)
    }

    pub fn last_index(&self) -> usize {
        self.stories.len() - 1
    }
}

impl Default for StoryCatalog {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_catalog_has_three_ordered_passages() {
        let catalog = StoryCatalog::reference();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.last_index(), 2);
        assert_eq!(catalog.get(0).unwrap().title, "The Tortoise and the Hare");
        assert_eq!(catalog.get(2).unwrap().ordinal_index, 2);
        assert!(catalog.get(3).is_none());
    }

    #[test]
    fn empty_catalog_is_refused() {
        assert!(StoryCatalog::new(Vec::new()).is_none());
    }
}
