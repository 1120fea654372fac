use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::event_bus::EventBus;
use crate::exchange::ExchangeProvider;
use crate::generator::SignalGenerator;
use crate::stats::StatsAggregator;
use crate::strategy_core::StrategyCoreBuilder;
use crate::types::{Frame, ProposalInterval, StrategyRanking, Symbol, WalkerCompleteEvent};

use super::backtest::BacktestDriver;

/// Which `StrategyStats` field a `WalkerDriver` sweep ranks strategies by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerMetric {
    SharpeRatio,
    AnnualizedSharpeRatio,
    WinRate,
    TotalPnl,
    CertaintyRatio,
    ExpectedYearlyReturns,
}

impl WalkerMetric {
    fn extract(self, stats: &crate::stats::StrategyStats) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match self {
            WalkerMetric::SharpeRatio => stats.sharpe_ratio,
            WalkerMetric::AnnualizedSharpeRatio => stats.annualized_sharpe_ratio,
            WalkerMetric::WinRate => stats.win_rate,
            WalkerMetric::TotalPnl => stats.total_pnl.to_f64(),
            WalkerMetric::CertaintyRatio => stats.certainty_ratio,
            WalkerMetric::ExpectedYearlyReturns => stats.expected_yearly_returns.and_then(|v| v.to_f64()),
        }
    }
}

/// Cooperative cancellation handle: a stop targeting `(symbol, strategy)`
/// that matches the sweep's current strategy aborts the whole sweep, per
/// spec — the aborted strategy contributes no ranking entry.
#[derive(Clone, Default)]
pub struct WalkerCancelToken {
    flag: Arc<AtomicBool>,
}

impl WalkerCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One strategy entry the walker sweeps: a name plus the generator that
/// produces its proposals. Each runs its own isolated `BacktestDriver` and
/// `StrategyCore` over the same frame and exchange.
pub struct WalkerCandidate {
    pub strategy_name: String,
    pub generator: Arc<dyn SignalGenerator>,
}

/// Sweeps a set of candidate strategies over the same `(symbol, frame)`,
/// running each to completion through a `BacktestDriver`, recording its
/// closed-signal statistics, and ranking them by a chosen `WalkerMetric`
/// once the sweep finishes.
pub struct WalkerDriver {
    symbol: Symbol,
    frame: Frame,
    proposal_interval: ProposalInterval,
    exchange: Arc<dyn ExchangeProvider>,
    config: Arc<crate::config::KernelConfig>,
    risk_gate: Arc<crate::risk_gate::RiskGate>,
    event_bus: Arc<EventBus>,
    stats: Arc<StatsAggregator>,
    metric: WalkerMetric,
    cancel_token: WalkerCancelToken,
}

#[allow(clippy::too_many_arguments)]
impl WalkerDriver {
    pub fn new(
        symbol: Symbol,
        frame: Frame,
        proposal_interval: ProposalInterval,
        exchange: Arc<dyn ExchangeProvider>,
        config: Arc<crate::config::KernelConfig>,
        risk_gate: Arc<crate::risk_gate::RiskGate>,
        event_bus: Arc<EventBus>,
        stats: Arc<StatsAggregator>,
        metric: WalkerMetric,
        cancel_token: WalkerCancelToken,
    ) -> Self {
        Self {
            symbol,
            frame,
            proposal_interval,
            exchange,
            config,
            risk_gate,
            event_bus,
            stats,
            metric,
            cancel_token,
        }
    }

    /// Runs every candidate to completion in turn, publishing a progress
    /// event per candidate and a final ranking event. If the cancel token
    /// fires while a candidate is running, the sweep stops immediately and
    /// that candidate's partial results are excluded from the ranking.
    pub async fn run(&self, candidates: Vec<WalkerCandidate>) -> anyhow::Result<WalkerCompleteEvent> {
        let total = candidates.len();
        let mut ranked = Vec::with_capacity(total);

        for (processed, candidate) in candidates.into_iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                warn!(strategy = candidate.strategy_name.as_str(), "walker sweep cancelled before candidate started");
                break;
            }

            self.event_bus
                .publish_progress_walker(crate::types::ProgressEvent {
                    processed,
                    total,
                    current_strategy: candidate.strategy_name.clone(),
                })
                .await;

            match self.run_one(&candidate).await {
                Ok(true) => {
                    let metric = self.stats.snapshot(&self.symbol, &candidate.strategy_name).await.and_then(|s| self.metric.extract(&s));
                    ranked.push(StrategyRanking { strategy_name: candidate.strategy_name, metric });
                }
                Ok(false) => {
                    warn!(strategy = candidate.strategy_name.as_str(), "walker sweep cancelled mid-candidate, dropping partial result");
                    break;
                }
                Err(err) => {
                    self.event_bus
                        .publish_error(crate::types::ErrorEvent {
                            symbol: self.symbol.clone(),
                            strategy_name: candidate.strategy_name.clone(),
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        }

        let best = ranked
            .iter()
            .filter(|r| r.metric.is_some())
            .max_by(|a, b| a.metric.unwrap().partial_cmp(&b.metric.unwrap()).unwrap());
        let event = WalkerCompleteEvent {
            best_strategy: best.map(|r| r.strategy_name.clone()),
            best_metric: best.and_then(|r| r.metric),
            ranked: sorted_descending(ranked),
        };
        self.event_bus.publish_walker_complete(event.clone()).await;
        self.event_bus.publish_done_walker("sweep complete").await;
        Ok(event)
    }

    /// Runs one candidate's `BacktestDriver` to exhaustion. Returns `Ok(false)`
    /// if cancelled mid-run (caller discards the candidate's ranking).
    async fn run_one(&self, candidate: &WalkerCandidate) -> anyhow::Result<bool> {
        let core = StrategyCoreBuilder {
            symbol: self.symbol.clone(),
            strategy_name: candidate.strategy_name.clone(),
            exchange_name: "walker".into(),
            frame_name: "walker-sweep".into(),
            proposal_interval: self.proposal_interval,
            backtest: true,
            config: Arc::clone(&self.config),
            exchange: Arc::clone(&self.exchange),
            risk_gate: Arc::clone(&self.risk_gate),
            position_store: Arc::new(crate::position_store::NoopPositionStore),
            event_bus: Arc::clone(&self.event_bus),
            generator: Arc::clone(&candidate.generator),
        }
        .build();

        let mut driver = BacktestDriver::new(core, Arc::clone(&self.exchange), &self.frame);
        while let Some(result) = driver.next().await? {
            if self.cancel_token.is_cancelled() {
                return Ok(false);
            }
            self.event_bus
                .publish_lifecycle(
                    true,
                    crate::types::LifecycleEvent {
                        symbol: self.symbol.clone(),
                        strategy_name: candidate.strategy_name.clone(),
                        exchange_name: "walker".into(),
                        frame_name: "walker-sweep".into(),
                        current_price: current_price_of(&result),
                        backtest: true,
                        result,
                    },
                )
                .await;
        }
        Ok(!self.cancel_token.is_cancelled())
    }
}

fn current_price_of(result: &crate::types::TickResult) -> rust_decimal::Decimal {
    use crate::types::TickResult;
    match result {
        TickResult::Closed { pnl, .. } => pnl.effective_exit,
        TickResult::Scheduled { signal } | TickResult::Opened { signal } | TickResult::Active { signal, .. } => signal.price_open,
        TickResult::Cancelled { signal, .. } => signal.price_open,
        TickResult::Idle => rust_decimal::Decimal::ZERO,
    }
}

/// Descending by metric, with `None` sorted last — `f64` isn't totally
/// ordered so this can't just derive `Ord`.
fn sorted_descending(mut ranked: Vec<StrategyRanking>) -> Vec<StrategyRanking> {
    ranked.sort_by(|a, b| match (a.metric, b.metric) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::risk_gate::RiskProfile;
    use crate::types::{Candle, Direction, Interval, Proposal};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    struct RampExchange;

    #[async_trait]
    impl ExchangeProvider for RampExchange {
        async fn get_candles(
            &self,
            _symbol: &Symbol,
            _interval: Interval,
            since: DateTime<Utc>,
            limit: usize,
        ) -> anyhow::Result<Vec<Candle>> {
            let mut out = Vec::new();
            for i in 0..limit.max(1) * 2 {
                let price = dec!(100) + Decimal::from(i as i64) * dec!(0.5);
                out.push(Candle {
                    open_time: since + Duration::minutes(i as i64),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: dec!(1),
                });
            }
            Ok(out)
        }

        fn format_price(&self, _symbol: &Symbol, price: Decimal) -> String {
            price.to_string()
        }

        fn format_quantity(&self, _symbol: &Symbol, quantity: Decimal) -> String {
            quantity.to_string()
        }
    }

    struct OneShotGenerator {
        proposal: Mutex<Option<Proposal>>,
    }

    #[async_trait]
    impl SignalGenerator for OneShotGenerator {
        async fn generate(&self, _symbol: &Symbol, _now: DateTime<Utc>) -> anyhow::Result<Option<Proposal>> {
            Ok(self.proposal.lock().await.take())
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            direction: Direction::Long,
            price_take_profit: dec!(102),
            price_stop_loss: dec!(95),
            minute_estimated_time: 60,
            price_open: None,
            id: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn s6_ranks_nonzero_sharpe_strategy_above_null_sharpe_strategy() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let frame = Frame::new(base, base + Duration::minutes(20), Interval::M1).unwrap();
        let exchange: Arc<dyn ExchangeProvider> = Arc::new(RampExchange);
        let config = Arc::new(KernelConfig::default());
        let risk_gate = Arc::new(crate::risk_gate::RiskGate::new(RiskProfile::new("default")));
        let event_bus = Arc::new(EventBus::new());
        let stats = Arc::new(StatsAggregator::new());

        let driver = WalkerDriver::new(
            Symbol::new("BTCUSDT"),
            frame,
            ProposalInterval::M1,
            exchange,
            config,
            risk_gate,
            Arc::clone(&event_bus),
            Arc::clone(&stats),
            WalkerMetric::SharpeRatio,
            WalkerCancelToken::new(),
        );

        let candidates = vec![WalkerCandidate {
            strategy_name: "ramp".into(),
            generator: Arc::new(OneShotGenerator { proposal: Mutex::new(Some(proposal())) }),
        }];

        let event = driver.run(candidates).await.unwrap();
        assert_eq!(event.ranked.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_drops_partial_result_from_ranking() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let frame = Frame::new(base, base + Duration::minutes(20), Interval::M1).unwrap();
        let exchange: Arc<dyn ExchangeProvider> = Arc::new(RampExchange);
        let config = Arc::new(KernelConfig::default());
        let risk_gate = Arc::new(crate::risk_gate::RiskGate::new(RiskProfile::new("default")));
        let event_bus = Arc::new(EventBus::new());
        let stats = Arc::new(StatsAggregator::new());
        let cancel_token = WalkerCancelToken::new();
        cancel_token.cancel();

        let driver = WalkerDriver::new(
            Symbol::new("BTCUSDT"),
            frame,
            ProposalInterval::M1,
            exchange,
            config,
            risk_gate,
            event_bus,
            stats,
            WalkerMetric::SharpeRatio,
            cancel_token,
        );

        let candidates = vec![WalkerCandidate {
            strategy_name: "aborted".into(),
            generator: Arc::new(OneShotGenerator { proposal: Mutex::new(Some(proposal())) }),
        }];

        let event = driver.run(candidates).await.unwrap();
        assert!(event.ranked.is_empty());
        assert!(event.best_strategy.is_none());
    }
}
