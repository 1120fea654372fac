use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::{CancelReason, CloseReason, Signal};
use super::symbol::Symbol;

/// PnL breakdown attached to a `closed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlBreakdown {
    pub pnl_percentage: Decimal,
    pub effective_entry: Decimal,
    pub effective_exit: Decimal,
}

/// The per-tick result `StrategyCore::tick` returns: a single tagged sum
/// type covering every outcome a tick can produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TickResult {
    Idle,
    Scheduled { signal: Signal },
    Opened { signal: Signal },
    Active { signal: Signal, percent_tp: Decimal, percent_sl: Decimal },
    Closed { signal: Signal, close_reason: CloseReason, close_timestamp: DateTime<Utc>, pnl: PnlBreakdown },
    Cancelled { signal: Signal, reason: CancelReason, cancel_id: Option<String> },
}

impl TickResult {
    pub fn action_name(&self) -> &'static str {
        match self {
            TickResult::Idle => "idle",
            TickResult::Scheduled { .. } => "scheduled",
            TickResult::Opened { .. } => "opened",
            TickResult::Active { .. } => "active",
            TickResult::Closed { .. } => "closed",
            TickResult::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickResult::Closed { .. } | TickResult::Cancelled { .. })
    }
}

/// The ambient envelope every lifecycle event carries alongside its
/// `TickResult` payload: symbol, strategy name, exchange name, frame name,
/// current price, and whether this is a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub exchange_name: String,
    pub frame_name: String,
    pub current_price: Decimal,
    pub backtest: bool,
    pub result: TickResult,
}

/// A risk-gate rejection. Not an error: a normal admission outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRejectEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub active_position_count: usize,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakevenEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub signal_id: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialEventKind {
    Profit,
    Loss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub signal_id: String,
    pub kind: PartialEventKind,
    pub band_percent: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub message: String,
}

/// Progress / completion payloads for `WalkerDriver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub current_strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRanking {
    pub strategy_name: String,
    pub metric: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerCompleteEvent {
    pub best_strategy: Option<String>,
    pub best_metric: Option<f64>,
    pub ranked: Vec<StrategyRanking>,
}

/// Emitted once per wall-clock minute per active signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub signal_id: String,
    pub at: DateTime<Utc>,
}
