//! Session history - a bounded sliding window of recent turns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use story_graph::SceneId;

/// One fully resolved turn, as remembered by the window and the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    /// Scene occupied after the turn resolved.
    pub scene_id: SceneId,
    pub action: String,
    pub narrative: String,
    #[serde(default)]
    pub stat_deltas: BTreeMap<String, i64>,
}

/// Fixed-capacity queue of the most recent turns.
///
/// Once full, the oldest record drops off silently; the unbounded record of
/// a session lives in the append-only log, not here.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    window: VecDeque<TurnRecord>,
    capacity: usize,
}

impl SessionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: TurnRecord) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(record);
    }

    /// Records oldest to newest.
    pub fn records(&self) -> impl Iterator<Item = &TurnRecord> {
        self.window.iter()
    }

    /// Owned copy of the window for snapshots and collaborator requests.
    pub fn recent(&self) -> Vec<TurnRecord> {
        self.window.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
