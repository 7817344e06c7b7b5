//! Director - the turn-sequential narrative state machine.
//!
//! One `Director` per session exclusively owns the player state, the engine
//! mode, and the scene cursor. A turn fully resolves - trigger evaluation,
//! stat mutation, terminal checks, persistence - before the next action is
//! accepted.
//!
//! Modes form a small state machine:
//!
//! - **Deterministic**: numbered options walk the validated graph; a
//!   free-form action leaves it, opening a bounded AI-takeover detour.
//! - **AiTakeover**: every action is delegated to the collaborator; each
//!   round (successful or failed) consumes one of `rounds_remaining`, and
//!   at zero the session re-rails onto a valid scene.
//! - **Terminal**: reached through an end scene, hp exhaustion, or the turn
//!   cap; only an explicit `reset` leaves it.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use story_graph::{
    ChoiceOption, PlayerState, RerailPolicy, Scene, SceneId, TriggerKind, WorldGraph,
};

use crate::collaborator::{Collaborator, CollaboratorRequest};
use crate::config::DirectorConfig;
use crate::events::{EventEngine, EventOutcome};
use crate::history::{SessionHistory, TurnRecord};
use crate::persistence::{
    MemorySnapshot, PersistenceError, SessionId, SessionPersistence, Surroundings,
};

/// Shown when a collaborator round fails and the story must carry on.
const DEGRADED_NARRATIVE: &str =
    "The thread of the story falters for a moment, then steadies.";
/// Shown on the turn that leaves the scripted path.
const OFF_SCRIPT_NARRATIVE: &str = "The story drifts off the charted path.";
/// Shown when the session hits its configured turn cap.
const TURN_LIMIT_NARRATIVE: &str = "The hour has come; this journey ends here.";

/// Why a session stopped accepting turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// An `is_end` scene was entered.
    StoryEnd,
    /// hp dropped to zero or below.
    SystemFailure,
    /// The configured `max_turns` cap was reached.
    TurnLimit,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TerminalReason::StoryEnd => "story end",
            TerminalReason::SystemFailure => "system failure",
            TerminalReason::TurnLimit => "turn limit",
        };
        write!(f, "{label}")
    }
}

/// The exactly-one active mode of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMode {
    Deterministic,
    AiTakeover {
        rounds_remaining: u32,
        origin_scene_id: SceneId,
    },
    Terminal {
        reason: TerminalReason,
    },
}

impl EngineMode {
    pub fn label(&self) -> &'static str {
        match self {
            EngineMode::Deterministic => "deterministic",
            EngineMode::AiTakeover { .. } => "ai_takeover",
            EngineMode::Terminal { .. } => "terminal",
        }
    }
}

/// A player's input for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    /// A numbered option, as displayed (1-based).
    Choose(usize),
    /// Anything typed that is not a numbered option.
    FreeForm(String),
}

impl std::fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerAction::Choose(number) => write!(f, "{number}"),
            PlayerAction::FreeForm(text) => write!(f, "{text}"),
        }
    }
}

/// Turn-time failures, typed so callers can tell "rejected, try again"
/// from "session over".
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("choice {choice} does not match any option of scene `{scene_id}` ({available} available)")]
    InvalidAction {
        choice: usize,
        scene_id: SceneId,
        available: usize,
    },
    #[error("action text is empty")]
    EmptyAction,
    #[error("session has ended: {reason}")]
    SessionEnded { reason: TerminalReason },
    #[error("session already begun")]
    AlreadyBegun,
    #[error("session has not begun")]
    NotBegun,
}

/// Everything a caller learns from one resolved turn.
#[derive(Debug)]
pub struct TurnReport {
    pub turn: u32,
    /// Composed narrative: scene text, fired trigger descriptions, or the
    /// collaborator's reply, in delivery order.
    pub narrative: String,
    /// Event ids of triggers that fired this turn.
    pub fired_events: Vec<String>,
    /// Scene occupied after the turn.
    pub scene_id: SceneId,
    /// Options open to the player (empty in AI-takeover and terminal modes).
    pub options: Vec<ChoiceOption>,
    /// Effective stat changes applied this turn (post-clamping).
    pub stat_deltas: BTreeMap<String, i64>,
    /// Snapshot copy of the player state.
    pub player: PlayerState,
    pub mode: EngineMode,
    pub terminal: Option<TerminalReason>,
    /// Best-effort persistence failures; the in-memory transition stands.
    pub write_errors: Vec<PersistenceError>,
}

/// Working accumulator for one turn's narrative, fired events, and deltas.
#[derive(Default)]
struct TurnContext {
    parts: Vec<String>,
    fired: Vec<String>,
    deltas: BTreeMap<String, i64>,
}

/// The narrative state machine. See the module docs for the mode diagram.
pub struct Director {
    graph: WorldGraph,
    config: DirectorConfig,
    collaborator: Box<dyn Collaborator>,
    persistence: SessionPersistence,
    events: EventEngine,
    history: SessionHistory,
    player: PlayerState,
    mode: EngineMode,
    current: SceneId,
    turn: u32,
    begun: bool,
}

impl Director {
    /// Build a director for one session over a validated graph.
    ///
    /// The collaborator and persistence sinks are injected so callers own
    /// the external boundaries; the initial player state comes from the
    /// graph.
    pub fn new(
        graph: WorldGraph,
        config: DirectorConfig,
        collaborator: Box<dyn Collaborator>,
        persistence: SessionPersistence,
    ) -> Self {
        let events = EventEngine::new(graph.triggers().to_vec());
        let history = SessionHistory::new(config.history_window);
        let player = graph.initial_player().clone();
        let current = graph.initial_scene_id().clone();
        Self {
            graph,
            config,
            collaborator,
            persistence,
            events,
            history,
            player,
            mode: EngineMode::Deterministic,
            current,
            turn: 0,
            begun: false,
        }
    }

    /// Replace the event engine with a seeded one, for deterministic tests.
    pub fn with_seeded_events(mut self, seed: u64) -> Self {
        self.events = EventEngine::with_seed(self.graph.triggers().to_vec(), seed);
        self
    }

    /// Start the session: enter the initial scene (a normal entry, triggers
    /// included), surface the story title and intro, and persist turn zero.
    pub fn begin(&mut self) -> Result<TurnReport, TurnError> {
        if self.begun {
            return Err(TurnError::AlreadyBegun);
        }
        self.begun = true;
        info!(session = %self.persistence.session(), scene = %self.current, "session started");

        let mut ctx = TurnContext::default();
        if !self.graph.title().is_empty() {
            ctx.parts.push(self.graph.title().to_string());
        }
        if !self.graph.intro_text().is_empty() {
            ctx.parts.push(self.graph.intro_text().to_string());
        }
        self.enter_scene(self.graph.initial_scene_id().clone(), &mut ctx);
        Ok(self.finish_turn("(session start)".to_string(), ctx, false))
    }

    /// Process one player action. The turn either fully resolves or leaves
    /// no trace: a rejected action mutates nothing and writes nothing.
    pub fn take_turn(&mut self, action: PlayerAction) -> Result<TurnReport, TurnError> {
        if !self.begun {
            return Err(TurnError::NotBegun);
        }
        match self.mode.clone() {
            EngineMode::Terminal { reason } => Err(TurnError::SessionEnded { reason }),
            EngineMode::Deterministic => match action {
                PlayerAction::Choose(number) => self.deterministic_choice(number),
                PlayerAction::FreeForm(text) => {
                    if text.trim().is_empty() {
                        return Err(TurnError::EmptyAction);
                    }
                    Ok(self.leave_the_rails(text))
                }
            },
            EngineMode::AiTakeover {
                rounds_remaining,
                origin_scene_id,
            } => self.takeover_round(action, rounds_remaining, origin_scene_id),
        }
    }

    /// Explicit full reset: initial player state, initial scene, fresh turn
    /// counter and history. The session log keeps its earlier records.
    pub fn reset(&mut self) -> Result<TurnReport, TurnError> {
        if !self.begun {
            return Err(TurnError::NotBegun);
        }
        info!("session reset");
        self.player = self.graph.initial_player().clone();
        self.mode = EngineMode::Deterministic;
        self.current = self.graph.initial_scene_id().clone();
        self.turn = 0;
        self.history.clear();
        if let Err(error) = self.persistence.log_note("session reset") {
            warn!(%error, "failed to record reset in session log");
        }

        let mut ctx = TurnContext::default();
        if !self.graph.intro_text().is_empty() {
            ctx.parts.push(self.graph.intro_text().to_string());
        }
        self.enter_scene(self.graph.initial_scene_id().clone(), &mut ctx);
        Ok(self.finish_turn("(session reset)".to_string(), ctx, false))
    }

    /// Put an item in the player's inventory and evaluate `item_acquired`
    /// triggers. Not a turn: the counter does not advance, but the change
    /// is persisted and the terminal override applies.
    pub fn grant_item(&mut self, item: &str) -> Result<TurnReport, TurnError> {
        if !self.begun {
            return Err(TurnError::NotBegun);
        }
        if let EngineMode::Terminal { reason } = self.mode {
            return Err(TurnError::SessionEnded { reason });
        }

        let count = self.player.grant_item(item);
        debug!(item, count, "item granted");
        let mut ctx = TurnContext::default();
        let outcomes = self.events.evaluate(&TriggerKind::ItemAcquired, item);
        self.apply_outcomes(outcomes, &mut ctx);
        if self.player.is_defeated() {
            self.set_terminal(TerminalReason::SystemFailure);
        }
        Ok(self.finish_turn(format!("(picked up {item})"), ctx, false))
    }

    pub fn mode(&self) -> &EngineMode {
        &self.mode
    }

    /// Snapshot copy of the player state; the live state never leaves the
    /// director.
    pub fn player(&self) -> PlayerState {
        self.player.clone()
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.graph.scene(self.current.as_str())
    }

    /// Delivery chunks of the current scene's narrative, sized per config.
    /// Chunking is presentation-side; `TurnReport::narrative` stays whole.
    pub fn current_scene_chunks(&self) -> Vec<&str> {
        self.current_scene()
            .map(|scene| scene.chunks(self.config.chunk_size))
            .unwrap_or_default()
    }

    pub fn current_scene_id(&self) -> &SceneId {
        &self.current
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn session(&self) -> SessionId {
        self.persistence.session()
    }

    /// Path of this session's append-only log.
    pub fn session_log_path(&self) -> &Path {
        self.persistence.log_path()
    }

    /// Path of the rewritten-each-turn memory snapshot.
    pub fn snapshot_file_path(&self) -> &Path {
        self.persistence.snapshot_path()
    }

    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    /// Assemble the current memory snapshot (also written after each turn).
    pub fn snapshot(&self) -> MemorySnapshot {
        let surroundings = match self.graph.scene(self.current.as_str()) {
            Some(scene) => Surroundings {
                narrative: scene.narrative.clone(),
                options: self.open_options().into_iter().map(|o| o.text).collect(),
            },
            None => Surroundings::default(),
        };
        MemorySnapshot {
            session: self.persistence.session(),
            saved_at: chrono::Utc::now(),
            player_state: self.player.clone(),
            current_location: self.current.clone(),
            mode: self.mode.label().to_string(),
            surroundings,
            recent_history: self.history.recent(),
        }
    }

    fn deterministic_choice(&mut self, number: usize) -> Result<TurnReport, TurnError> {
        let (action_text, target) = {
            let scene = match self.graph.scene(self.current.as_str()) {
                Some(scene) => scene,
                None => {
                    return Err(TurnError::InvalidAction {
                        choice: number,
                        scene_id: self.current.clone(),
                        available: 0,
                    })
                }
            };
            match scene.option(number) {
                Some(option) => (option.text.clone(), option.next_scene_id.clone()),
                None => {
                    return Err(TurnError::InvalidAction {
                        choice: number,
                        scene_id: self.current.clone(),
                        available: scene.options.len(),
                    })
                }
            }
        };

        debug!(choice = number, target = %target, "option taken");
        let mut ctx = TurnContext::default();
        self.enter_scene(target, &mut ctx);
        Ok(self.finish_turn(action_text, ctx, true))
    }

    /// A free-form action opens a bounded AI detour. The entering turn only
    /// evaluates action triggers; the collaborator is first consulted on
    /// the next action.
    fn leave_the_rails(&mut self, text: String) -> TurnReport {
        let mut ctx = TurnContext::default();
        let outcomes = self.events.evaluate(&TriggerKind::ActionTaken, &text);
        self.apply_outcomes(outcomes, &mut ctx);

        if self.player.is_defeated() {
            self.set_terminal(TerminalReason::SystemFailure);
        } else {
            let rounds = self
                .graph
                .takeover()
                .max_rounds
                .unwrap_or(self.config.takeover_rounds)
                .max(1);
            info!(rounds, origin = %self.current, "leaving the scripted path");
            self.mode = EngineMode::AiTakeover {
                rounds_remaining: rounds,
                origin_scene_id: self.current.clone(),
            };
            ctx.parts.push(OFF_SCRIPT_NARRATIVE.to_string());
        }
        self.finish_turn(text, ctx, true)
    }

    fn takeover_round(
        &mut self,
        action: PlayerAction,
        rounds_remaining: u32,
        origin: SceneId,
    ) -> Result<TurnReport, TurnError> {
        let action_text = action.to_string();
        if action_text.trim().is_empty() {
            return Err(TurnError::EmptyAction);
        }

        let mut ctx = TurnContext::default();
        let request = CollaboratorRequest {
            scene_id: origin.clone(),
            action: action_text.clone(),
            player: self.player.clone(),
            recent_history: self.history.recent(),
        };
        match self.collaborator.request(request) {
            Ok(reply) => {
                let deltas = self.graph.stat_rules().sanitize(&reply.stat_deltas);
                self.apply_delta_map(&deltas, &mut ctx);
                ctx.parts.push(reply.narrative);
            }
            Err(error) => {
                // A failed round still burns a round; the detour stays bounded.
                warn!(%error, "collaborator round degraded");
                ctx.parts.push(DEGRADED_NARRATIVE.to_string());
            }
        }

        let rounds_remaining = rounds_remaining.saturating_sub(1);
        if self.player.is_defeated() {
            self.set_terminal(TerminalReason::SystemFailure);
        } else if rounds_remaining == 0 {
            let target = match &self.graph.takeover().rerail {
                RerailPolicy::Origin => origin,
                RerailPolicy::Scene(id) => id.clone(),
            };
            info!(target = %target, "re-railing onto the scripted path");
            self.mode = EngineMode::Deterministic;
            self.enter_scene(target, &mut ctx);
        } else {
            self.mode = EngineMode::AiTakeover {
                rounds_remaining,
                origin_scene_id: origin,
            };
        }
        Ok(self.finish_turn(action_text, ctx, true))
    }

    /// Move the cursor to `id` (validated at load or re-rail time), deliver
    /// its narrative, fire `scene_enter` triggers, and apply the terminal
    /// rules: hp exhaustion overrides everything, then `is_end`.
    fn enter_scene(&mut self, id: SceneId, ctx: &mut TurnContext) {
        self.current = id;
        let (narrative, is_end) = match self.graph.scene(self.current.as_str()) {
            Some(scene) => (scene.narrative.clone(), scene.is_end),
            None => (String::new(), false),
        };
        if !narrative.is_empty() {
            ctx.parts.push(narrative);
        }

        let outcomes = self
            .events
            .evaluate(&TriggerKind::SceneEnter, self.current.as_str());
        self.apply_outcomes(outcomes, ctx);

        if self.player.is_defeated() {
            self.set_terminal(TerminalReason::SystemFailure);
        } else if is_end {
            self.set_terminal(TerminalReason::StoryEnd);
        }
    }

    fn apply_outcomes(&mut self, outcomes: Vec<EventOutcome>, ctx: &mut TurnContext) {
        for outcome in outcomes {
            if !outcome.fired {
                continue;
            }
            ctx.fired.push(outcome.trigger.event_id.clone());
            if !outcome.trigger.narrative_description.is_empty() {
                ctx.parts.push(outcome.trigger.narrative_description.clone());
            }
            self.apply_delta_map(&outcome.trigger.result, ctx);
        }
    }

    /// Apply a sanitized delta map, recording the effective (post-clamp)
    /// change per stat.
    fn apply_delta_map(&mut self, deltas: &BTreeMap<String, i64>, ctx: &mut TurnContext) {
        for (stat, delta) in deltas {
            let clamped = self.graph.stat_rules().is_floor_clamped(stat);
            let before = self.player.stat(stat).unwrap_or(0);
            let after = self.player.apply_delta(stat, *delta, clamped);
            *ctx.deltas.entry(stat.clone()).or_insert(0) += after - before;
        }
    }

    fn set_terminal(&mut self, reason: TerminalReason) {
        info!(%reason, "session terminal");
        self.mode = EngineMode::Terminal { reason };
    }

    /// Seal a resolved turn: enforce the turn cap, record history, attempt
    /// both persistence writes, and assemble the report.
    fn finish_turn(&mut self, action: String, mut ctx: TurnContext, advance: bool) -> TurnReport {
        if advance {
            self.turn += 1;
            if let Some(limit) = self.config.max_turns {
                if self.turn >= limit && !matches!(self.mode, EngineMode::Terminal { .. }) {
                    self.set_terminal(TerminalReason::TurnLimit);
                    ctx.parts.push(TURN_LIMIT_NARRATIVE.to_string());
                }
            }
        }

        let narrative = ctx.parts.join("\n\n");
        self.history.push(TurnRecord {
            turn: self.turn,
            scene_id: self.current.clone(),
            action: action.clone(),
            narrative: narrative.clone(),
            stat_deltas: ctx.deltas.clone(),
        });

        let mut write_errors = Vec::new();
        if let Err(error) = self.persistence.log_turn(&action, &narrative) {
            warn!(%error, "session log append failed");
            write_errors.push(error);
        }
        if let Err(error) = self.persistence.write_snapshot(&self.snapshot()) {
            warn!(%error, "snapshot rewrite failed");
            write_errors.push(error);
        }

        let terminal = match &self.mode {
            EngineMode::Terminal { reason } => Some(*reason),
            _ => None,
        };
        TurnReport {
            turn: self.turn,
            narrative,
            fired_events: ctx.fired,
            scene_id: self.current.clone(),
            options: self.open_options(),
            stat_deltas: ctx.deltas,
            player: self.player.clone(),
            mode: self.mode.clone(),
            terminal,
            write_errors,
        }
    }

    fn open_options(&self) -> Vec<ChoiceOption> {
        match self.mode {
            EngineMode::Deterministic => self
                .graph
                .scene(self.current.as_str())
                .map(|scene| scene.options.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
