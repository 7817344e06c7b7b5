//! Event engine - probabilistic trigger evaluation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use story_graph::{EventTrigger, TriggerKind};

/// One trigger's fate within a single evaluation call.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub trigger: EventTrigger,
    pub fired: bool,
}

/// Evaluates triggers against a turn's context.
///
/// Matching triggers are sampled independently against their declared
/// probability and reported in declaration order. A trigger is considered
/// at most once per call; separate calls are fully independent, so
/// re-entering the same scene can fire the same trigger again.
#[derive(Debug)]
pub struct EventEngine {
    triggers: Vec<EventTrigger>,
    rng: StdRng,
}

impl EventEngine {
    pub fn new(triggers: Vec<EventTrigger>) -> Self {
        Self {
            triggers,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampling for tests.
    pub fn with_seed(triggers: Vec<EventTrigger>, seed: u64) -> Self {
        Self {
            triggers,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Evaluate every trigger listening for `kind` + `key`.
    pub fn evaluate(&mut self, kind: &TriggerKind, key: &str) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        for trigger in &self.triggers {
            if !trigger.matches(kind, key) {
                continue;
            }
            // gen() yields [0, 1), so 0.0 never fires and 1.0 always does.
            let fired = self.rng.gen::<f64>() < trigger.probability;
            debug!(event_id = %trigger.event_id, fired, "trigger evaluated");
            outcomes.push(EventOutcome {
                trigger: trigger.clone(),
                fired,
            });
        }
        outcomes
    }
}
