//! Event triggers - content-defined conditional stat mutations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kinds of events a trigger can listen for.
///
/// Content may declare kinds the engine does not recognize; they load as
/// `Custom` and simply never match engine-driven evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerKind {
    SceneEnter,
    ItemAcquired,
    ActionTaken,
    Custom(String),
}

impl TriggerKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::SceneEnter => "scene_enter",
            TriggerKind::ItemAcquired => "item_acquired",
            TriggerKind::ActionTaken => "action_taken",
            TriggerKind::Custom(kind) => kind,
        }
    }
}

impl From<String> for TriggerKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "scene_enter" => TriggerKind::SceneEnter,
            "item_acquired" => TriggerKind::ItemAcquired,
            "action_taken" => TriggerKind::ActionTaken,
            _ => TriggerKind::Custom(kind),
        }
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conditional stat mutation declared by content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub event_id: String,
    pub trigger_type: TriggerKind,
    /// The scene id, item name, or action keyword that must match.
    pub condition: String,
    /// Chance of firing, in [0.0, 1.0]; range-checked at load time.
    pub probability: f64,
    /// Text surfaced to the player when the trigger fires.
    pub narrative_description: String,
    /// Stat name -> signed delta, applied in declaration order.
    #[serde(default)]
    pub result: BTreeMap<String, i64>,
}

impl EventTrigger {
    /// Whether this trigger listens for the given evaluation context.
    ///
    /// Scene and item conditions match exactly; action conditions are
    /// keywords searched case-insensitively inside the action text.
    pub fn matches(&self, kind: &TriggerKind, key: &str) -> bool {
        if self.trigger_type != *kind {
            return false;
        }
        match self.trigger_type {
            TriggerKind::ActionTaken => key
                .to_lowercase()
                .contains(&self.condition.to_lowercase()),
            _ => self.condition == key,
        }
    }
}
