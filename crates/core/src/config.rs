//! Rule configuration for the decision engine and action handlers.
//!
//! Every pedagogical threshold lives here rather than as a literal in the
//! engine, since the tuning values are expected to drift between deployments.
//! `Rules::default()` carries the canonical table.

use serde::{Deserialize, Serialize};

/// A mastery-delta range, resolved against the learner's current mastery.
///
/// Problems presented at higher mastery are harder and therefore carry larger
/// stakes: the applied delta interpolates linearly from `min` (mastery 0.0)
/// to `max` (mastery 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRange {
    pub min: f64,
    pub max: f64,
}

impl DeltaRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Resolves the range at the given mastery level.
    pub fn at(&self, mastery: f64) -> f64 {
        let m = mastery.clamp(0.0, 1.0);
        self.min + (self.max - self.min) * m
    }
}

/// The canonical rule table driving `decide` and the action handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Below this, the learner still needs theory or guided practice.
    pub low_mastery: f64,
    /// Upper bound of the independent-practice comfort band.
    pub comfort_ceiling: f64,
    /// Mastery gate for advancement with a steady correct streak.
    pub advance_mastery: f64,
    /// Correct streak required at `advance_mastery`.
    pub advance_streak: u32,
    /// Mastery gate for advancement on a short streak.
    pub fast_advance_mastery: f64,
    /// Correct streak required at `fast_advance_mastery`.
    pub fast_advance_streak: u32,
    /// Consecutive incorrect answers before instruction is simplified.
    pub simplify_after: u32,
    /// Consecutive incorrect answers before the phase steps back and theory
    /// is re-presented. Distinct from (and higher than) `simplify_after`.
    pub hard_simplify_after: u32,
    /// Multiplier applied to mastery by the soft simplify branch.
    pub mastery_decay: f64,
    /// Mastery never decays below this.
    pub mastery_floor: f64,
    /// Seed mastery for a topic the first time it is initialized.
    pub initial_mastery: f64,
    /// Mastery gained for a correct guided-practice answer.
    pub guided_gain: DeltaRange,
    /// Mastery lost for an incorrect guided-practice answer.
    pub guided_loss: DeltaRange,
    /// Mastery gained for a correct independent-practice answer.
    pub independent_gain: DeltaRange,
    /// Mastery lost for an incorrect independent-practice answer.
    pub independent_loss: DeltaRange,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            low_mastery: 0.3,
            comfort_ceiling: 0.7,
            advance_mastery: 0.6,
            advance_streak: 2,
            fast_advance_mastery: 0.8,
            fast_advance_streak: 1,
            simplify_after: 3,
            hard_simplify_after: 5,
            mastery_decay: 0.7,
            mastery_floor: 0.05,
            initial_mastery: 0.1,
            guided_gain: DeltaRange::new(0.10, 0.20),
            guided_loss: DeltaRange::new(0.05, 0.10),
            independent_gain: DeltaRange::new(0.15, 0.30),
            independent_loss: DeltaRange::new(0.08, 0.15),
        }
    }
}
