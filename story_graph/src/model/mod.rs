//! Model definitions for the narrative graph.

mod player;
mod scene;
mod trigger;

pub use player::*;
pub use scene::*;
pub use trigger::*;

use serde::{Deserialize, Serialize};

/// Unique identifier for scenes in the narrative graph.
///
/// Scene ids are content-defined string keys ("intro", "hallway"), not
/// generated values; the loader guarantees every id held by a validated
/// graph resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Create a scene id from a content key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SceneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SceneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for SceneId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
