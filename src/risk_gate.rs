use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Mode, Signal, Symbol};

/// A single ordered validation: a predicate over the current admission
/// snapshot, paired with a descriptive note used when it fails. Each risk
/// profile holds an ordered list of these predicates.
pub type RiskValidation = Arc<dyn Fn(&RiskCheckInput) -> Result<(), String> + Send + Sync>;

/// Everything a risk predicate is allowed to see: the proposed signal, the
/// current count of open positions for this profile, and the full key set —
/// enough for e.g. "no more than 3 long positions concurrently" without
/// reaching into any other component's state.
pub struct RiskCheckInput<'a> {
    pub signal: &'a Signal,
    pub active_position_count: usize,
    pub active_positions: &'a HashSet<(String, Symbol)>,
}

/// A named collection of validations plus an optional hard cap, registered
/// once at startup and never mutated at runtime.
#[derive(Clone)]
pub struct RiskProfile {
    pub name: String,
    pub max_concurrent_positions: Option<usize>,
    validations: Vec<RiskValidation>,
}

impl RiskProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_concurrent_positions: None,
            validations: Vec::new(),
        }
    }

    pub fn with_max_concurrent_positions(mut self, max: usize) -> Self {
        self.max_concurrent_positions = Some(max);
        self
    }

    pub fn with_validation(
        mut self,
        predicate: impl Fn(&RiskCheckInput) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validations.push(Arc::new(predicate));
        self
    }
}

/// Either admission (no side effects) or a structured rejection carrying
/// an id and a descriptive note.
#[derive(Debug, Clone)]
pub enum RiskDecision {
    Allowed,
    Rejected { id: String, note: String },
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allowed)
    }
}

/// Per-(risk profile, mode) in-memory set of open positions. A single
/// `tokio::sync::Mutex` serializes `check`/`add`/`remove` for this gate so
/// admission decisions always see a consistent snapshot.
pub struct RiskGate {
    profile: RiskProfile,
    open: AsyncMutex<HashSet<(String, Symbol)>>,
}

impl RiskGate {
    pub fn new(profile: RiskProfile) -> Self {
        Self {
            profile,
            open: AsyncMutex::new(HashSet::new()),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile.name
    }

    /// Runs each configured validation in order against a consistent
    /// snapshot. The gate does not consult price or timestamp itself (spec
    /// that is `SignalValidator`'s job; this only sees the uniform
    /// admission snapshot user predicates need.
    pub async fn check_signal(&self, signal: &Signal) -> RiskDecision {
        let open = self.open.lock().await;

        if let Some(max) = self.profile.max_concurrent_positions {
            if open.len() >= max {
                return RiskDecision::Rejected {
                    id: Uuid::new_v4().to_string(),
                    note: format!(
                        "risk profile '{}': max_concurrent_positions ({}) reached",
                        self.profile.name, max
                    ),
                };
            }
        }

        let input = RiskCheckInput {
            signal,
            active_position_count: open.len(),
            active_positions: &open,
        };

        for validation in &self.profile.validations {
            if let Err(note) = validation(&input) {
                return RiskDecision::Rejected {
                    id: Uuid::new_v4().to_string(),
                    note,
                };
            }
        }

        RiskDecision::Allowed
    }

    pub async fn add_signal(&self, symbol: &Symbol, strategy_name: &str) {
        let mut open = self.open.lock().await;
        open.insert((strategy_name.to_string(), symbol.clone()));
    }

    pub async fn remove_signal(&self, symbol: &Symbol, strategy_name: &str) {
        let mut open = self.open.lock().await;
        open.remove(&(strategy_name.to_string(), symbol.clone()));
    }

    pub async fn active_position_count(&self) -> usize {
        self.open.lock().await.len()
    }
}

/// Explicit registry of `RiskGate`s keyed by `(profile name, mode)`: a
/// plain concurrent map keyed by a value type rather than an implicit
/// ambient per-name singleton cache.
#[derive(Default)]
pub struct RiskGateRegistry {
    gates: RwLock<HashMap<(String, ModeKey), Arc<RiskGate>>>,
    profiles: RwLock<HashMap<String, RiskProfile>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ModeKey {
    Live,
    Backtest,
}

impl From<Mode> for ModeKey {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Live => ModeKey::Live,
            Mode::Backtest => ModeKey::Backtest,
        }
    }
}

impl RiskGateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_profile(&self, profile: RiskProfile) {
        self.profiles.write().await.insert(profile.name.clone(), profile);
    }

    /// Returns the gate for `(profile_name, mode)`, creating it on first use.
    pub async fn gate(&self, profile_name: &str, mode: Mode) -> anyhow::Result<Arc<RiskGate>> {
        let key = (profile_name.to_string(), ModeKey::from(mode));
        if let Some(gate) = self.gates.read().await.get(&key) {
            return Ok(Arc::clone(gate));
        }

        let mut gates = self.gates.write().await;
        if let Some(gate) = gates.get(&key) {
            return Ok(Arc::clone(gate));
        }

        let profile = self
            .profiles
            .read()
            .await
            .get(profile_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown risk profile '{profile_name}'"))?;

        let gate = Arc::new(RiskGate::new(profile));
        gates.insert(key, Arc::clone(&gate));
        Ok(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Signal};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn signal(strategy: &str, symbol: &str) -> Signal {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Signal {
            id: "sig".into(),
            direction: Direction::Long,
            price_open: dec!(100),
            price_take_profit: dec!(101),
            price_stop_loss: dec!(99),
            price_open_requested: None,
            minute_estimated_time: 60,
            scheduled_at: now,
            pending_at: now,
            symbol: Symbol::new(symbol),
            strategy_name: strategy.into(),
            exchange_name: "demo".into(),
            frame_name: "".into(),
            note: None,
            trailing_stop_loss: None,
            trailing_take_profit: None,
            partial_closes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn admits_within_max_concurrent() {
        let profile = RiskProfile::new("default").with_max_concurrent_positions(1);
        let gate = RiskGate::new(profile);
        assert!(gate.check_signal(&signal("trend", "BTCUSDT")).await.is_allowed());
        gate.add_signal(&Symbol::new("BTCUSDT"), "trend").await;
        let decision = gate.check_signal(&signal("trend", "ETHUSDT")).await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn remove_frees_a_slot() {
        let profile = RiskProfile::new("default").with_max_concurrent_positions(1);
        let gate = RiskGate::new(profile);
        gate.add_signal(&Symbol::new("BTCUSDT"), "trend").await;
        gate.remove_signal(&Symbol::new("BTCUSDT"), "trend").await;
        assert!(gate.check_signal(&signal("trend", "ETHUSDT")).await.is_allowed());
    }

    #[tokio::test]
    async fn custom_validation_rejects_with_its_note() {
        let profile = RiskProfile::new("longs-only").with_validation(|input| {
            if input.signal.direction == Direction::Long {
                Ok(())
            } else {
                Err("only long signals admitted".to_string())
            }
        });
        let gate = RiskGate::new(profile);
        let mut short = signal("trend", "BTCUSDT");
        short.direction = Direction::Short;
        let decision = gate.check_signal(&short).await;
        match decision {
            RiskDecision::Rejected { note, .. } => assert_eq!(note, "only long signals admitted"),
            RiskDecision::Allowed => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn registry_memoizes_gate_per_profile_and_mode() {
        let registry = RiskGateRegistry::new();
        registry.register_profile(RiskProfile::new("default")).await;
        let g1 = registry.gate("default", Mode::Live).await.unwrap();
        let g2 = registry.gate("default", Mode::Live).await.unwrap();
        assert!(Arc::ptr_eq(&g1, &g2));
        let g3 = registry.gate("default", Mode::Backtest).await.unwrap();
        assert!(!Arc::ptr_eq(&g1, &g3));
    }
}
