//! Collaborator interface - the external AI co-narrator boundary.
//!
//! The engine treats the co-narrator as an opaque synchronous function:
//! context in, narrative and stat deltas out. The trait is injected at
//! director construction so tests and offline play substitute a scripted
//! stand-in; nothing here knows about transports or models.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

use story_graph::{PlayerState, SceneId};

use crate::history::TurnRecord;

/// Context handed to the co-narrator for one detour round.
#[derive(Debug, Clone, Serialize)]
pub struct CollaboratorRequest {
    /// The scene the detour started from.
    pub scene_id: SceneId,
    /// The player's raw action text.
    pub action: String,
    /// Snapshot copy; the live state is never exposed.
    pub player: PlayerState,
    pub recent_history: Vec<TurnRecord>,
}

/// What the co-narrator returns for a round.
///
/// The delta map may be partial or reference stats the theme never
/// declared; the director discards unrecognized keys rather than failing
/// the turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorReply {
    pub narrative: String,
    #[serde(default)]
    pub stat_deltas: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The call outlived its deadline. Consumes the round.
    #[error("collaborator timed out after {0} ms")]
    Timeout(u64),
    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// A synchronous AI co-narrator.
///
/// The engine blocks on `request` and never issues a second call while one
/// is outstanding.
pub trait Collaborator {
    fn request(
        &mut self,
        request: CollaboratorRequest,
    ) -> Result<CollaboratorReply, CollaboratorError>;
}

/// Canned collaborator for tests and offline sessions: pops one scripted
/// result per round, in order, and fails once the script runs dry.
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    script: VecDeque<Result<CollaboratorReply, CollaboratorError>>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful round.
    pub fn with_reply(mut self, narrative: &str, stat_deltas: BTreeMap<String, i64>) -> Self {
        self.script.push_back(Ok(CollaboratorReply {
            narrative: narrative.to_string(),
            stat_deltas,
        }));
        self
    }

    /// Queue a failed round.
    pub fn with_error(mut self, error: CollaboratorError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Collaborator for ScriptedCollaborator {
    fn request(
        &mut self,
        _request: CollaboratorRequest,
    ) -> Result<CollaboratorReply, CollaboratorError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::Failed("script exhausted".to_string())))
    }
}
