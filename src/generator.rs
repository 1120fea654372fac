use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Proposal, Symbol};

/// The user-supplied signal proposer. Invoked synchronously by
/// `StrategyCore` on demand, throttled by the strategy's configured cadence
/// — the kernel never schedules it on its own clock.
///
/// Must be callable concurrently across different `(strategy, symbol)`
/// pairs, but `StrategyCore` never re-enters it for the same pair.
#[async_trait]
pub trait SignalGenerator: Send + Sync {
    /// Returns `None` when the strategy has nothing to propose this tick.
    async fn generate(&self, symbol: &Symbol, now: DateTime<Utc>) -> anyhow::Result<Option<Proposal>>;
}
