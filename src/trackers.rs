use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::types::{Direction, PartialKind};

/// Band step between successive milestones (10%, 20%, 30%, ...). Not
/// independently configurable, so it is a fixed constant rather than a
/// `KernelConfig` field.
const PARTIAL_BAND_STEP: i64 = 10;

/// Per-signal milestone detector: tracks which profit/loss band levels have
/// already been emitted so repeated ticks in the same band don't re-fire.
#[derive(Default)]
pub struct PartialTracker {
    emitted_profit: HashMap<String, HashSet<i64>>,
    emitted_loss: HashMap<String, HashSet<i64>>,
}

impl PartialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes `revenuePercent` (direction-adjusted signed move from
    /// entry) and returns every newly crossed band, in ascending order, as
    /// `(kind, band_percent)`. The caller publishes one event per entry and
    /// may react by calling `StrategyCore::partial_profit`/`partial_loss`.
    pub fn check(
        &mut self,
        signal_id: &str,
        direction: Direction,
        entry: Decimal,
        current_price: Decimal,
    ) -> Vec<(PartialKind, Decimal)> {
        if entry.is_zero() {
            return Vec::new();
        }
        let raw_move = (current_price - entry) / entry * Decimal::from(100);
        let revenue_percent = match direction {
            Direction::Long => raw_move,
            Direction::Short => -raw_move,
        };

        let mut crossed = Vec::new();
        if revenue_percent.is_sign_positive() {
            let seen = self.emitted_profit.entry(signal_id.to_string()).or_default();
            for band in bands_up_to(revenue_percent) {
                if seen.insert(band) {
                    crossed.push((PartialKind::Profit, Decimal::from(band)));
                }
            }
        } else {
            let magnitude = -revenue_percent;
            let seen = self.emitted_loss.entry(signal_id.to_string()).or_default();
            for band in bands_up_to(magnitude) {
                if seen.insert(band) {
                    crossed.push((PartialKind::Loss, Decimal::from(band)));
                }
            }
        }
        crossed
    }

    /// Drops all tracked state for a signal once it closes/cancels.
    pub fn clear(&mut self, signal_id: &str) {
        self.emitted_profit.remove(signal_id);
        self.emitted_loss.remove(signal_id);
    }
}

fn bands_up_to(magnitude: Decimal) -> Vec<i64> {
    let mut out = Vec::new();
    let mut band = PARTIAL_BAND_STEP;
    while Decimal::from(band) <= magnitude {
        out.push(band);
        band += PARTIAL_BAND_STEP;
    }
    out
}

/// Per-signal single-shot breakeven arm: once price has moved the
/// round-trip cost past entry in the favorable direction, replace the
/// stop-loss with entry and fire exactly one event. Idempotent thereafter.
#[derive(Default)]
pub struct BreakevenTracker {
    armed: HashSet<String>,
}

impl BreakevenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, signal_id: &str) -> bool {
        self.armed.contains(signal_id)
    }

    /// Returns `true` exactly once per signal, the moment it first arms.
    pub fn try_arm(
        &mut self,
        signal_id: &str,
        direction: Direction,
        entry: Decimal,
        current_price: Decimal,
        threshold: Decimal,
    ) -> bool {
        if self.armed.contains(signal_id) || entry.is_zero() {
            return false;
        }
        let raw_move = (current_price - entry) / entry * Decimal::from(100);
        let favorable_move = match direction {
            Direction::Long => raw_move,
            Direction::Short => -raw_move,
        };
        if favorable_move >= threshold * Decimal::from(100) {
            self.armed.insert(signal_id.to_string());
            return true;
        }
        false
    }

    pub fn clear(&mut self, signal_id: &str) {
        self.armed.remove(signal_id);
    }
}
