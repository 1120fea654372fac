use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::event_bus::EventBus;
use crate::types::{LifecycleEvent, Symbol, TickResult};

/// Bounded history length per `(symbol, strategy)`, per spec: "the most
/// recent 250" lifecycle events are retained for reporting.
const HISTORY_CAPACITY: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AggregateKey {
    symbol: Symbol,
    strategy_name: String,
}

/// One closed signal's contribution to the running statistics: its PnL and
/// how long it was open, in days (as `f64` — see `StrategyStats` for why).
struct ClosedSample {
    pnl_percentage: Decimal,
    duration_days: f64,
}

#[derive(Default)]
struct AggregateState {
    history: VecDeque<LifecycleEvent>,
    closes: Vec<ClosedSample>,
}

impl AggregateState {
    fn push_history(&mut self, event: LifecycleEvent) {
        let incoming_is_idle = matches!(event.result, TickResult::Idle);
        if incoming_is_idle {
            if let Some(last) = self.history.back() {
                if matches!(last.result, TickResult::Idle) {
                    self.history.pop_back();
                }
            }
        }
        self.history.push_back(event);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }
}

/// Per-(symbol, strategy) statistics computed from closed-signal history.
/// Every field here that is fundamentally a ratio (stdev, Sharpe-like
/// ratios, win rate) is `f64` and converted at this boundary — never
/// `Decimal` — matching the teacher's `MetricsCalculator::compute_sharpe_sortino`
/// convention. Money-like accumulations (`total_pnl`, `avg_pnl`) stay `Decimal`.
/// Any statistic whose computation would be NaN, infinite, or divide by zero
/// is `None` rather than a poisoned float.
#[derive(Debug, Clone)]
pub struct StrategyStats {
    pub total_closed: usize,
    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate: Option<f64>,
    pub total_pnl: Decimal,
    pub avg_pnl: Option<Decimal>,
    pub std_dev: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub annualized_sharpe_ratio: Option<f64>,
    pub certainty_ratio: Option<f64>,
    pub expected_yearly_returns: Option<Decimal>,
}

fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let result = numerator / denominator;
    result.is_finite().then_some(result)
}

fn compute_stats(closes: &[ClosedSample]) -> StrategyStats {
    let total_closed = closes.len();
    let win_count = closes.iter().filter(|c| c.pnl_percentage > Decimal::ZERO).count();
    let loss_count = closes.iter().filter(|c| c.pnl_percentage < Decimal::ZERO).count();

    let win_rate = safe_div(win_count as f64 * 100.0, total_closed as f64);

    let total_pnl: Decimal = closes.iter().map(|c| c.pnl_percentage).sum();
    let avg_pnl = if total_closed == 0 {
        None
    } else {
        Some(total_pnl / Decimal::from(total_closed))
    };

    let avg_pnl_f64 = avg_pnl.and_then(|v| v.to_f64()).unwrap_or(0.0);
    let std_dev = if total_closed == 0 {
        None
    } else {
        let variance: f64 = closes
            .iter()
            .map(|c| {
                let pnl = c.pnl_percentage.to_f64().unwrap_or(0.0);
                let diff = pnl - avg_pnl_f64;
                diff * diff
            })
            .sum::<f64>()
            / total_closed as f64;
        let sd = variance.sqrt();
        sd.is_finite().then_some(sd)
    };

    let sharpe_ratio = match (avg_pnl, std_dev) {
        (Some(_), Some(sd)) => safe_div(avg_pnl_f64, sd),
        _ => None,
    };
    let annualized_sharpe_ratio = sharpe_ratio.map(|s| s * 365f64.sqrt());

    let wins: Vec<f64> = closes
        .iter()
        .filter(|c| c.pnl_percentage > Decimal::ZERO)
        .map(|c| c.pnl_percentage.to_f64().unwrap_or(0.0))
        .collect();
    let losses: Vec<f64> = closes
        .iter()
        .filter(|c| c.pnl_percentage < Decimal::ZERO)
        .map(|c| c.pnl_percentage.to_f64().unwrap_or(0.0))
        .collect();
    let avg_win = (!wins.is_empty()).then(|| wins.iter().sum::<f64>() / wins.len() as f64);
    let avg_loss = (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64);
    let certainty_ratio = match (avg_win, avg_loss) {
        (Some(win), Some(loss)) => safe_div(win, loss.abs()),
        _ => None,
    };

    let avg_duration_days = if total_closed == 0 {
        None
    } else {
        let sum: f64 = closes.iter().map(|c| c.duration_days).sum();
        Some(sum / total_closed as f64)
    };
    let expected_yearly_returns = match (avg_pnl, avg_duration_days) {
        (Some(avg), Some(duration)) => safe_div(365.0, duration)
            .map(|ratio| avg * Decimal::try_from(ratio).unwrap_or(Decimal::ZERO)),
        _ => None,
    };

    StrategyStats {
        total_closed,
        win_count,
        loss_count,
        win_rate,
        total_pnl,
        avg_pnl,
        std_dev,
        sharpe_ratio,
        annualized_sharpe_ratio,
        certainty_ratio,
        expected_yearly_returns,
    }
}

/// Accumulates closed-signal outcomes per `(symbol, strategy)` from the
/// lifecycle event stream and answers snapshot queries for `WalkerDriver`
/// and any CLI reporting.
#[derive(Default)]
pub struct StatsAggregator {
    state: RwLock<HashMap<AggregateKey, AggregateState>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one lifecycle event into the bounded history and, if it is a
    /// `closed` event, into the running PnL/duration accumulators.
    pub async fn record(&self, event: LifecycleEvent) {
        let key = AggregateKey {
            symbol: event.symbol.clone(),
            strategy_name: event.strategy_name.clone(),
        };

        if let TickResult::Closed { signal, close_timestamp, pnl, .. } = &event.result {
            let duration_days =
                (*close_timestamp - signal.pending_at).num_milliseconds() as f64 / 86_400_000.0;
            let mut state = self.state.write().await;
            let entry = state.entry(key.clone()).or_default();
            entry.closes.push(ClosedSample {
                pnl_percentage: pnl.pnl_percentage,
                duration_days: duration_days.max(0.0),
            });
        }

        let mut state = self.state.write().await;
        state.entry(key).or_default().push_history(event);
    }

    /// Computes the current statistics for `(symbol, strategy)`, or `None`
    /// if no closed events have been recorded for that pair yet.
    pub async fn snapshot(&self, symbol: &Symbol, strategy_name: &str) -> Option<StrategyStats> {
        let key = AggregateKey { symbol: symbol.clone(), strategy_name: strategy_name.to_string() };
        let state = self.state.read().await;
        let entry = state.get(&key)?;
        if entry.closes.is_empty() {
            return None;
        }
        Some(compute_stats(&entry.closes))
    }

    pub async fn history(&self, symbol: &Symbol, strategy_name: &str) -> Vec<LifecycleEvent> {
        let key = AggregateKey { symbol: symbol.clone(), strategy_name: strategy_name.to_string() };
        let state = self.state.read().await;
        state.get(&key).map(|e| e.history.iter().cloned().collect()).unwrap_or_default()
    }

    /// Subscribes to the bus's union lifecycle channel and folds every
    /// event in as it arrives. Returns the task handle so the caller can
    /// abort it alongside its driver.
    pub fn spawn(self: Arc<Self>, event_bus: Arc<EventBus>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = event_bus.signal_any.subscribe().await;
            while let Some(event) = rx.recv().await {
                self.record(event).await;
            }
            warn!("stats aggregator subscription channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloseReason, Direction, PnlBreakdown, Signal};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn base_signal(now: DateTime<Utc>) -> Signal {
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
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "A".into(),
            exchange_name: "demo".into(),
            frame_name: "frame".into(),
            note: None,
            trailing_stop_loss: None,
            trailing_take_profit: None,
            partial_closes: Vec::new(),
        }
    }

    fn closed_event(strategy: &str, now: DateTime<Utc>, pnl: Decimal) -> LifecycleEvent {
        let mut signal = base_signal(now);
        signal.strategy_name = strategy.into();
        LifecycleEvent {
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: strategy.into(),
            exchange_name: "demo".into(),
            frame_name: "frame".into(),
            current_price: dec!(101),
            backtest: true,
            result: TickResult::Closed {
                signal,
                close_reason: CloseReason::TakeProfit,
                close_timestamp: now + chrono::Duration::hours(1),
                pnl: PnlBreakdown { pnl_percentage: pnl, effective_entry: dec!(100), effective_exit: dec!(101) },
            },
        }
    }

    #[tokio::test]
    async fn no_closes_yields_no_snapshot() {
        let aggregator = StatsAggregator::new();
        assert!(aggregator.snapshot(&Symbol::new("BTCUSDT"), "A").await.is_none());
    }

    #[tokio::test]
    async fn s6_zero_stdev_yields_null_sharpe() {
        // Strategy A: two closes of +1%, +1% => stdev 0 => sharpe null (S6).
        let aggregator = StatsAggregator::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        aggregator.record(closed_event("A", now, dec!(1))).await;
        aggregator.record(closed_event("A", now + chrono::Duration::hours(2), dec!(1))).await;

        let stats = aggregator.snapshot(&Symbol::new("BTCUSDT"), "A").await.unwrap();
        assert_eq!(stats.total_closed, 2);
        assert_eq!(stats.std_dev, Some(0.0));
        assert!(stats.sharpe_ratio.is_none());
    }

    #[tokio::test]
    async fn s6_nonzero_stdev_yields_sharpe_one() {
        // Strategy B: closes of +2%, 0% => avgPnl 1, stdev 1 => sharpe 1 (S6).
        let aggregator = StatsAggregator::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        aggregator.record(closed_event("B", now, dec!(2))).await;
        aggregator.record(closed_event("B", now + chrono::Duration::hours(2), dec!(0))).await;

        let stats = aggregator.snapshot(&Symbol::new("BTCUSDT"), "B").await.unwrap();
        assert!((stats.sharpe_ratio.unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_dedups_consecutive_idle_events() {
        let aggregator = StatsAggregator::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let idle = LifecycleEvent {
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "A".into(),
            exchange_name: "demo".into(),
            frame_name: "".into(),
            current_price: Decimal::ZERO,
            backtest: false,
            result: TickResult::Idle,
        };
        aggregator.record(idle.clone()).await;
        aggregator.record(idle.clone()).await;
        aggregator.record(idle).await;
        aggregator.record(closed_event("A", now, dec!(1))).await;

        let history = aggregator.history(&Symbol::new("BTCUSDT"), "A").await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn history_caps_at_250() {
        let aggregator = StatsAggregator::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..300 {
            aggregator.record(closed_event("A", now + chrono::Duration::seconds(i), dec!(1))).await;
        }
        let history = aggregator.history(&Symbol::new("BTCUSDT"), "A").await;
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }
}
