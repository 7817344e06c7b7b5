//! Raw content documents - the on-disk shape of a theme.
//!
//! A theme decouples narrative content from the logic graph across three
//! documents: `world.json` (graph structure and player setup), `story.json`
//! (long-form text), and `events.json` (trigger declarations). These types
//! mirror that contract verbatim; resolution and integrity checking happen
//! in the loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `world.json` - graph structure, player setup, and detour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldDoc {
    pub initial_scene_id: String,
    /// Starting stat vector; the declared keys form the stat vocabulary.
    /// Absent, the engine defaults apply.
    #[serde(default)]
    pub player: Option<BTreeMap<String, i64>>,
    /// Stats that may never drop below zero.
    #[serde(default)]
    pub floor_clamped: Vec<String>,
    pub scenes: BTreeMap<String, SceneDoc>,
    /// AI-takeover settings for this theme.
    #[serde(default)]
    pub takeover: Option<TakeoverDoc>,
}

/// One scene entry inside `world.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDoc {
    /// Reference into `story.json` scripts. Exactly one of `story_ref` and
    /// `text` must be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_ref: Option<String>,
    /// Inline narrative text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub is_end: bool,
    #[serde(default)]
    pub options: Vec<OptionDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDoc {
    pub id: String,
    pub text: String,
    pub next_scene_id: String,
}

/// Content-level AI-takeover settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoverDoc {
    /// Detour length in collaborator rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Explicit re-rail target scene; absent, the detour returns to its origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerail: Option<String>,
}

/// `story.json` - title, intro, and the long-form script store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryDoc {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_intro")]
    pub intro_text: String,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl Default for StoryDoc {
    fn default() -> Self {
        Self {
            title: default_title(),
            intro_text: default_intro(),
            scripts: BTreeMap::new(),
        }
    }
}

/// `events.json` - trigger declarations, applied in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsDoc {
    #[serde(default)]
    pub triggers: Vec<TriggerDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDoc {
    pub event_id: String,
    pub trigger_type: String,
    pub condition: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
    pub narrative_description: String,
    #[serde(default)]
    pub result: BTreeMap<String, i64>,
}

fn default_max_rounds() -> u32 {
    3
}

fn default_probability() -> f64 {
    1.0
}

fn default_title() -> String {
    "A New Adventure".to_string()
}

fn default_intro() -> String {
    "You stand at the beginning of a mysterious journey...".to_string()
}

impl WorldDoc {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl StoryDoc {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl EventsDoc {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_doc_parses_minimal_scene() {
        let world = WorldDoc::from_json(
            r#"{
                "initial_scene_id": "intro",
                "scenes": {
                    "intro": {
                        "text": "It begins.",
                        "options": [
                            {"id": "go", "text": "Go", "next_scene_id": "intro"}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(world.initial_scene_id, "intro");
        assert!(world.player.is_none());
        assert!(world.takeover.is_none());
        let intro = &world.scenes["intro"];
        assert!(!intro.is_end);
        assert_eq!(intro.options.len(), 1);
        assert_eq!(intro.options[0].next_scene_id, "intro");
    }

    #[test]
    fn test_trigger_probability_defaults_to_certain() {
        let events = EventsDoc::from_json(
            r#"{
                "triggers": [
                    {
                        "event_id": "pipes",
                        "trigger_type": "scene_enter",
                        "condition": "hallway",
                        "narrative_description": "The pipes murmur.",
                        "result": {"hp": -5}
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(events.triggers[0].probability, 1.0);
        assert_eq!(events.triggers[0].result.get("hp"), Some(&-5));
    }

    #[test]
    fn test_story_doc_defaults() {
        let story = StoryDoc::from_json("{}").unwrap();
        assert_eq!(story.title, "A New Adventure");
        assert!(story.scripts.is_empty());
    }

    #[test]
    fn test_takeover_doc_defaults() {
        let world = WorldDoc::from_json(
            r#"{
                "initial_scene_id": "a",
                "scenes": {"a": {"text": "x", "is_end": true}},
                "takeover": {}
            }"#,
        )
        .unwrap();

        let takeover = world.takeover.unwrap();
        assert_eq!(takeover.max_rounds, 3);
        assert!(takeover.rerail.is_none());
    }
}
