//! Player state - the stat vector and inventory owned by the director.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Stat that forces the "system failure" terminal state when it drops to zero.
pub const HP_STAT: &str = "hp";

/// The player's current stats and inventory.
///
/// Stats are a mapping from a content-declared vocabulary to signed values;
/// the inventory maps item names to counts. Nothing outside the director
/// mutates a live `PlayerState` - collaborators receive snapshot copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
}

impl PlayerState {
    /// Create a player with the given starting stats and an empty inventory.
    pub fn with_stats(stats: BTreeMap<String, i64>) -> Self {
        Self {
            stats,
            inventory: BTreeMap::new(),
        }
    }

    /// The stat vocabulary used when content declares no player block.
    pub fn default_stats() -> BTreeMap<String, i64> {
        BTreeMap::from([
            (HP_STAT.to_string(), 100),
            ("mana".to_string(), 50),
            ("bullets".to_string(), 10),
            ("credits".to_string(), 10),
        ])
    }

    pub fn stat(&self, name: &str) -> Option<i64> {
        self.stats.get(name).copied()
    }

    /// Apply a signed delta and return the resulting value.
    ///
    /// Floor-clamped stats stop at zero; all others may go negative.
    pub fn apply_delta(&mut self, stat: &str, delta: i64, floor_clamped: bool) -> i64 {
        let value = self.stats.entry(stat.to_string()).or_insert(0);
        *value += delta;
        if floor_clamped && *value < 0 {
            *value = 0;
        }
        *value
    }

    /// Whether the player has hit the hp-based terminal condition.
    ///
    /// A vocabulary without an `hp` stat never reports defeat.
    pub fn is_defeated(&self) -> bool {
        self.stats.get(HP_STAT).map_or(false, |hp| *hp <= 0)
    }

    /// Add one of an item to the inventory, returning the new count.
    pub fn grant_item(&mut self, item: &str) -> u32 {
        let count = self.inventory.entry(item.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.item_count(item) > 0
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }
}

/// The declared stat vocabulary and per-stat clamping rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRules {
    vocabulary: BTreeSet<String>,
    floor_clamped: BTreeSet<String>,
}

impl StatRules {
    pub fn new(vocabulary: BTreeSet<String>, floor_clamped: BTreeSet<String>) -> Self {
        Self {
            vocabulary,
            floor_clamped,
        }
    }

    pub fn declares(&self, stat: &str) -> bool {
        self.vocabulary.contains(stat)
    }

    pub fn is_floor_clamped(&self, stat: &str) -> bool {
        self.floor_clamped.contains(stat)
    }

    /// Drop deltas addressed to undeclared stats.
    ///
    /// This is how malformed or partial collaborator replies are tolerated:
    /// unrecognized keys are discarded instead of failing the turn.
    pub fn sanitize(&self, deltas: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
        let mut sanitized = BTreeMap::new();
        for (stat, delta) in deltas {
            if self.declares(stat) {
                sanitized.insert(stat.clone(), *delta);
            } else {
                warn!(stat, delta, "discarding delta for undeclared stat");
            }
        }
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_unclamped_goes_negative() {
        let mut player = PlayerState::with_stats(BTreeMap::from([("credits".to_string(), 10)]));
        assert_eq!(player.apply_delta("credits", -25, false), -15);
        assert_eq!(player.stat("credits"), Some(-15));
    }

    #[test]
    fn test_apply_delta_floor_clamped_stops_at_zero() {
        let mut player = PlayerState::with_stats(BTreeMap::from([("bullets".to_string(), 3)]));
        assert_eq!(player.apply_delta("bullets", -10, true), 0);
    }

    #[test]
    fn test_defeat_requires_hp_at_or_below_zero() {
        let mut player = PlayerState::with_stats(PlayerState::default_stats());
        assert!(!player.is_defeated());

        player.apply_delta(HP_STAT, -100, false);
        assert!(player.is_defeated());
    }

    #[test]
    fn test_no_hp_stat_means_no_defeat() {
        let player = PlayerState::with_stats(BTreeMap::from([("mana".to_string(), 0)]));
        assert!(!player.is_defeated());
    }

    #[test]
    fn test_inventory_counts() {
        let mut player = PlayerState::default();
        assert!(!player.has_item("lantern"));
        assert_eq!(player.grant_item("lantern"), 1);
        assert_eq!(player.grant_item("lantern"), 2);
        assert_eq!(player.item_count("lantern"), 2);
    }

    #[test]
    fn test_sanitize_drops_undeclared_stats() {
        let rules = StatRules::new(
            BTreeSet::from(["hp".to_string(), "mana".to_string()]),
            BTreeSet::new(),
        );
        let deltas = BTreeMap::from([
            ("hp".to_string(), -5),
            ("xp".to_string(), 50),
            ("mana".to_string(), 2),
        ]);

        let sanitized = rules.sanitize(&deltas);
        assert_eq!(sanitized.len(), 2);
        assert_eq!(sanitized.get("hp"), Some(&-5));
        assert!(sanitized.get("xp").is_none());
    }
}
