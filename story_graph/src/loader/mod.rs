//! Loader and validator - turns raw content documents into a certified
//! `WorldGraph`, or fails with every violation found.
//!
//! Validation is aggregate by design: a content author gets the complete
//! list of problems in one pass instead of fixing them one error at a time.
//! A `WorldGraph` is never partially valid - every id it hands out resolves.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::content::{EventsDoc, StoryDoc, WorldDoc};
use crate::model::{
    ChoiceOption, EventTrigger, PlayerState, Scene, SceneId, StatRules, TriggerKind,
};

/// A single integrity problem found during validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentViolation {
    #[error("option `{option_id}` in scene `{scene_id}` targets unknown scene `{target}`")]
    DanglingOption {
        scene_id: String,
        option_id: String,
        target: String,
    },
    #[error("scene `{scene_id}` references unknown script `{script_ref}`")]
    DanglingScriptRef { scene_id: String, script_ref: String },
    #[error("scene `{scene_id}` must declare exactly one of `story_ref` or `text`")]
    AmbiguousNarrativeSource { scene_id: String },
    #[error("initial scene `{0}` does not exist")]
    MissingInitialScene(String),
    #[error("duplicate option id `{option_id}` in scene `{scene_id}`")]
    DuplicateOptionId { scene_id: String, option_id: String },
    #[error("duplicate trigger event id `{0}`")]
    DuplicateEventId(String),
    #[error("trigger `{event_id}` has probability {probability} outside [0.0, 1.0]")]
    ProbabilityOutOfRange { event_id: String, probability: f64 },
    #[error("trigger `{event_id}` result references undeclared stat `{stat}`")]
    UndeclaredStat { event_id: String, stat: String },
    #[error("floor-clamp rule references undeclared stat `{0}`")]
    UndeclaredClampStat(String),
    #[error("trigger `{event_id}` scene condition `{condition}` does not match any scene")]
    DanglingSceneCondition { event_id: String, condition: String },
    #[error("non-end scene `{0}` has no options")]
    DeadEndScene(String),
    #[error("end scene `{0}` declares options")]
    EndSceneWithOptions(String),
    #[error("re-rail target `{0}` does not exist")]
    MissingRerailTarget(String),
}

/// Aggregate of every violation found in one validation pass.
#[derive(Debug, Error)]
pub struct ContentIntegrityError {
    pub violations: Vec<ContentViolation>,
}

impl std::fmt::Display for ContentIntegrityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "content failed validation with {} violation(s):",
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

/// Failure to produce a graph from a theme directory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in `{path}`: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Integrity(#[from] ContentIntegrityError),
}

/// Where a finished AI detour lands back in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RerailPolicy {
    /// Return to the scene the detour started from.
    Origin,
    /// Land on a content-designated scene.
    Scene(SceneId),
}

impl Default for RerailPolicy {
    fn default() -> Self {
        RerailPolicy::Origin
    }
}

/// Resolved AI-takeover settings for a theme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeoverSettings {
    /// Detour length; `None` defers to the engine configuration.
    pub max_rounds: Option<u32>,
    pub rerail: RerailPolicy,
}

/// The fully resolved, certified narrative graph.
#[derive(Debug, Clone)]
pub struct WorldGraph {
    title: String,
    intro_text: String,
    scenes: HashMap<SceneId, Scene>,
    initial_scene_id: SceneId,
    triggers: Vec<EventTrigger>,
    initial_player: PlayerState,
    stat_rules: StatRules,
    takeover: TakeoverSettings,
}

impl WorldGraph {
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn initial_scene_id(&self) -> &SceneId {
        &self.initial_scene_id
    }

    /// Triggers in content declaration order.
    pub fn triggers(&self) -> &[EventTrigger] {
        &self.triggers
    }

    pub fn initial_player(&self) -> &PlayerState {
        &self.initial_player
    }

    pub fn stat_rules(&self) -> &StatRules {
        &self.stat_rules
    }

    pub fn takeover(&self) -> &TakeoverSettings {
        &self.takeover
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn intro_text(&self) -> &str {
        &self.intro_text
    }
}

/// Validate the three content documents and assemble a `WorldGraph`.
///
/// Checks, in order: option targets resolve, narrative sources resolve,
/// the initial scene exists, scene-keyed trigger conditions resolve,
/// option/event ids are unique, probabilities are in range, trigger results
/// and clamp rules stay inside the declared stat vocabulary, and scene
/// shape matches its `is_end` flag. All violations are reported together.
pub fn load(
    world: WorldDoc,
    story: StoryDoc,
    events: EventsDoc,
) -> Result<WorldGraph, ContentIntegrityError> {
    let mut violations = Vec::new();
    let scene_ids: BTreeSet<&str> = world.scenes.keys().map(String::as_str).collect();

    let player_stats = world.player.clone().unwrap_or_else(PlayerState::default_stats);
    let vocabulary: BTreeSet<String> = player_stats.keys().cloned().collect();
    for stat in &world.floor_clamped {
        if !vocabulary.contains(stat) {
            violations.push(ContentViolation::UndeclaredClampStat(stat.clone()));
        }
    }
    let stat_rules = StatRules::new(
        vocabulary,
        world.floor_clamped.iter().cloned().collect(),
    );

    let mut scenes = HashMap::with_capacity(world.scenes.len());
    for (scene_id, doc) in &world.scenes {
        let narrative = match (&doc.story_ref, &doc.text) {
            (Some(script_ref), None) => match story.scripts.get(script_ref) {
                Some(text) => text.clone(),
                None => {
                    violations.push(ContentViolation::DanglingScriptRef {
                        scene_id: scene_id.clone(),
                        script_ref: script_ref.clone(),
                    });
                    String::new()
                }
            },
            (None, Some(text)) => text.clone(),
            _ => {
                violations.push(ContentViolation::AmbiguousNarrativeSource {
                    scene_id: scene_id.clone(),
                });
                String::new()
            }
        };

        let mut seen_options = BTreeSet::new();
        for option in &doc.options {
            if !seen_options.insert(option.id.as_str()) {
                violations.push(ContentViolation::DuplicateOptionId {
                    scene_id: scene_id.clone(),
                    option_id: option.id.clone(),
                });
            }
            if !scene_ids.contains(option.next_scene_id.as_str()) {
                violations.push(ContentViolation::DanglingOption {
                    scene_id: scene_id.clone(),
                    option_id: option.id.clone(),
                    target: option.next_scene_id.clone(),
                });
            }
        }

        if doc.is_end && !doc.options.is_empty() {
            violations.push(ContentViolation::EndSceneWithOptions(scene_id.clone()));
        }
        if !doc.is_end && doc.options.is_empty() {
            violations.push(ContentViolation::DeadEndScene(scene_id.clone()));
        }

        scenes.insert(
            SceneId::new(scene_id),
            Scene {
                id: SceneId::new(scene_id),
                narrative,
                is_end: doc.is_end,
                options: doc
                    .options
                    .iter()
                    .map(|option| ChoiceOption {
                        id: option.id.clone(),
                        text: option.text.clone(),
                        next_scene_id: SceneId::new(&option.next_scene_id),
                    })
                    .collect(),
            },
        );
    }

    if !scene_ids.contains(world.initial_scene_id.as_str()) {
        violations.push(ContentViolation::MissingInitialScene(
            world.initial_scene_id.clone(),
        ));
    }

    let mut seen_events = BTreeSet::new();
    let mut triggers = Vec::with_capacity(events.triggers.len());
    for doc in &events.triggers {
        if !seen_events.insert(doc.event_id.as_str()) {
            violations.push(ContentViolation::DuplicateEventId(doc.event_id.clone()));
        }
        if !(0.0..=1.0).contains(&doc.probability) {
            violations.push(ContentViolation::ProbabilityOutOfRange {
                event_id: doc.event_id.clone(),
                probability: doc.probability,
            });
        }

        let trigger_type = TriggerKind::from(doc.trigger_type.clone());
        if trigger_type == TriggerKind::SceneEnter {
            if !scene_ids.contains(doc.condition.as_str()) {
                violations.push(ContentViolation::DanglingSceneCondition {
                    event_id: doc.event_id.clone(),
                    condition: doc.condition.clone(),
                });
            }
        } else {
            // Item and action conditions are validated dynamically at runtime.
            warn!(
                event_id = %doc.event_id,
                kind = %trigger_type,
                condition = %doc.condition,
                "trigger condition is not checked against the graph"
            );
        }

        for stat in doc.result.keys() {
            if !stat_rules.declares(stat) {
                violations.push(ContentViolation::UndeclaredStat {
                    event_id: doc.event_id.clone(),
                    stat: stat.clone(),
                });
            }
        }

        triggers.push(EventTrigger {
            event_id: doc.event_id.clone(),
            trigger_type,
            condition: doc.condition.clone(),
            probability: doc.probability,
            narrative_description: doc.narrative_description.clone(),
            result: doc.result.clone(),
        });
    }

    let takeover = match &world.takeover {
        Some(doc) => {
            let rerail = match &doc.rerail {
                Some(target) => {
                    if !scene_ids.contains(target.as_str()) {
                        violations.push(ContentViolation::MissingRerailTarget(target.clone()));
                    }
                    RerailPolicy::Scene(SceneId::new(target))
                }
                None => RerailPolicy::Origin,
            };
            TakeoverSettings {
                max_rounds: Some(doc.max_rounds.max(1)),
                rerail,
            }
        }
        None => TakeoverSettings::default(),
    };

    if !violations.is_empty() {
        return Err(ContentIntegrityError { violations });
    }

    Ok(WorldGraph {
        title: story.title,
        intro_text: story.intro_text,
        scenes,
        initial_scene_id: SceneId::new(world.initial_scene_id),
        triggers,
        initial_player: PlayerState::with_stats(player_stats),
        stat_rules,
        takeover,
    })
}

/// Load a theme directory: `world.json` plus optional `story.json` and
/// `events.json` (absent files fall back to empty defaults).
pub fn load_theme_dir(dir: impl AsRef<Path>) -> Result<WorldGraph, LoadError> {
    let dir = dir.as_ref();
    let world: WorldDoc = read_doc(&dir.join("world.json"))?;
    let story: StoryDoc = read_optional_doc(&dir.join("story.json"))?.unwrap_or_default();
    let events: EventsDoc = read_optional_doc(&dir.join("events.json"))?.unwrap_or_default();
    Ok(load(world, story, events)?)
}

fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_optional_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LoadError> {
    if !path.exists() {
        return Ok(None);
    }
    read_doc(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{OptionDoc, SceneDoc, TakeoverDoc, TriggerDoc};
    use std::collections::BTreeMap;

    fn scene_doc(text: &str, options: Vec<OptionDoc>, is_end: bool) -> SceneDoc {
        SceneDoc {
            story_ref: None,
            text: Some(text.to_string()),
            is_end,
            options,
        }
    }

    fn option_doc(id: &str, target: &str) -> OptionDoc {
        OptionDoc {
            id: id.to_string(),
            text: format!("take {id}"),
            next_scene_id: target.to_string(),
        }
    }

    fn two_scene_world() -> WorldDoc {
        WorldDoc {
            initial_scene_id: "intro".to_string(),
            player: Some(BTreeMap::from([("hp".to_string(), 100)])),
            floor_clamped: Vec::new(),
            scenes: BTreeMap::from([
                (
                    "intro".to_string(),
                    scene_doc("It begins.", vec![option_doc("door", "finale")], false),
                ),
                ("finale".to_string(), scene_doc("It ends.", Vec::new(), true)),
            ]),
            takeover: None,
        }
    }

    #[test]
    fn test_valid_world_loads() {
        let graph = load(two_scene_world(), StoryDoc::default(), EventsDoc::default()).unwrap();

        assert_eq!(graph.scene_count(), 2);
        assert_eq!(graph.initial_scene_id().as_str(), "intro");
        assert!(graph.contains("finale"));
        assert_eq!(graph.initial_player().stat("hp"), Some(100));
        assert_eq!(graph.takeover().rerail, RerailPolicy::Origin);
    }

    #[test]
    fn test_story_ref_resolves_from_scripts() {
        let mut world = two_scene_world();
        world.scenes.get_mut("intro").unwrap().text = None;
        world.scenes.get_mut("intro").unwrap().story_ref = Some("opening".to_string());
        let story = StoryDoc {
            scripts: BTreeMap::from([("opening".to_string(), "From the scripts.".to_string())]),
            ..StoryDoc::default()
        };

        let graph = load(world, story, EventsDoc::default()).unwrap();
        assert_eq!(graph.scene("intro").unwrap().narrative, "From the scripts.");
    }

    #[test]
    fn test_all_violations_reported_together() {
        let world = WorldDoc {
            initial_scene_id: "nowhere".to_string(),
            player: Some(BTreeMap::from([("hp".to_string(), 100)])),
            floor_clamped: vec!["bullets".to_string()],
            scenes: BTreeMap::from([
                (
                    "intro".to_string(),
                    scene_doc(
                        "Twice the same option id.",
                        vec![
                            option_doc("door", "missing"),
                            option_doc("door", "intro"),
                        ],
                        false,
                    ),
                ),
                ("stuck".to_string(), scene_doc("No way out.", Vec::new(), false)),
            ]),
            takeover: None,
        };
        let events = EventsDoc {
            triggers: vec![TriggerDoc {
                event_id: "bad".to_string(),
                trigger_type: "scene_enter".to_string(),
                condition: "absent".to_string(),
                probability: 1.5,
                narrative_description: String::new(),
                result: BTreeMap::from([("xp".to_string(), 10)]),
            }],
        };

        let err = load(world, StoryDoc::default(), events).unwrap_err();
        let violations = &err.violations;

        assert!(violations.contains(&ContentViolation::MissingInitialScene("nowhere".to_string())));
        assert!(violations.contains(&ContentViolation::DanglingOption {
            scene_id: "intro".to_string(),
            option_id: "door".to_string(),
            target: "missing".to_string(),
        }));
        assert!(violations.contains(&ContentViolation::DuplicateOptionId {
            scene_id: "intro".to_string(),
            option_id: "door".to_string(),
        }));
        assert!(violations.contains(&ContentViolation::DeadEndScene("stuck".to_string())));
        assert!(violations.contains(&ContentViolation::UndeclaredClampStat("bullets".to_string())));
        assert!(violations.contains(&ContentViolation::ProbabilityOutOfRange {
            event_id: "bad".to_string(),
            probability: 1.5,
        }));
        assert!(violations.contains(&ContentViolation::DanglingSceneCondition {
            event_id: "bad".to_string(),
            condition: "absent".to_string(),
        }));
        assert!(violations.contains(&ContentViolation::UndeclaredStat {
            event_id: "bad".to_string(),
            stat: "xp".to_string(),
        }));
        assert!(err.to_string().contains("violation(s)"));
    }

    #[test]
    fn test_dangling_script_ref_is_a_violation() {
        let mut world = two_scene_world();
        world.scenes.get_mut("intro").unwrap().text = None;
        world.scenes.get_mut("intro").unwrap().story_ref = Some("lost".to_string());

        let err = load(world, StoryDoc::default(), EventsDoc::default()).unwrap_err();
        assert!(err.violations.contains(&ContentViolation::DanglingScriptRef {
            scene_id: "intro".to_string(),
            script_ref: "lost".to_string(),
        }));
    }

    #[test]
    fn test_scene_needs_exactly_one_narrative_source() {
        let mut world = two_scene_world();
        let intro = world.scenes.get_mut("intro").unwrap();
        intro.story_ref = Some("opening".to_string());
        // Both story_ref and text set.
        let err = load(world, StoryDoc::default(), EventsDoc::default()).unwrap_err();
        assert!(err
            .violations
            .contains(&ContentViolation::AmbiguousNarrativeSource {
                scene_id: "intro".to_string(),
            }));
    }

    #[test]
    fn test_end_scene_with_options_rejected() {
        let mut world = two_scene_world();
        world
            .scenes
            .get_mut("finale")
            .unwrap()
            .options
            .push(option_doc("loop", "intro"));

        let err = load(world, StoryDoc::default(), EventsDoc::default()).unwrap_err();
        assert!(err
            .violations
            .contains(&ContentViolation::EndSceneWithOptions("finale".to_string())));
    }

    #[test]
    fn test_duplicate_event_ids_rejected() {
        let trigger = TriggerDoc {
            event_id: "echo".to_string(),
            trigger_type: "scene_enter".to_string(),
            condition: "intro".to_string(),
            probability: 0.5,
            narrative_description: String::new(),
            result: BTreeMap::new(),
        };
        let events = EventsDoc {
            triggers: vec![trigger.clone(), trigger],
        };

        let err = load(two_scene_world(), StoryDoc::default(), events).unwrap_err();
        assert_eq!(
            err.violations,
            vec![ContentViolation::DuplicateEventId("echo".to_string())]
        );
    }

    #[test]
    fn test_explicit_rerail_target_is_validated() {
        let mut world = two_scene_world();
        world.takeover = Some(TakeoverDoc {
            max_rounds: 2,
            rerail: Some("gone".to_string()),
        });

        let err = load(world, StoryDoc::default(), EventsDoc::default()).unwrap_err();
        assert!(err
            .violations
            .contains(&ContentViolation::MissingRerailTarget("gone".to_string())));
    }

    #[test]
    fn test_takeover_settings_resolve() {
        let mut world = two_scene_world();
        world.takeover = Some(TakeoverDoc {
            max_rounds: 5,
            rerail: Some("finale".to_string()),
        });

        let graph = load(world, StoryDoc::default(), EventsDoc::default()).unwrap();
        assert_eq!(graph.takeover().max_rounds, Some(5));
        assert_eq!(
            graph.takeover().rerail,
            RerailPolicy::Scene(SceneId::new("finale"))
        );
    }

    #[test]
    fn test_missing_player_block_uses_default_stats() {
        let mut world = two_scene_world();
        world.player = None;

        let graph = load(world, StoryDoc::default(), EventsDoc::default()).unwrap();
        assert_eq!(graph.initial_player().stat("hp"), Some(100));
        assert_eq!(graph.initial_player().stat("mana"), Some(50));
        assert!(graph.stat_rules().declares("credits"));
    }

    #[test]
    fn test_load_theme_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("world.json"),
            r#"{
                "initial_scene_id": "intro",
                "scenes": {
                    "intro": {"story_ref": "opening", "options": [{"id": "on", "text": "Press on", "next_scene_id": "finale"}]},
                    "finale": {"text": "Done.", "is_end": true}
                }
            }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("story.json"),
            r#"{"title": "Pipes", "intro_text": "Steam rises.", "scripts": {"opening": "The hub."}}"#,
        )
        .unwrap();

        let graph = load_theme_dir(dir.path()).unwrap();
        assert_eq!(graph.title(), "Pipes");
        assert_eq!(graph.scene("intro").unwrap().narrative, "The hub.");
        // events.json absent: no triggers.
        assert!(graph.triggers().is_empty());
    }

    #[test]
    fn test_load_theme_dir_missing_world_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_theme_dir(dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
