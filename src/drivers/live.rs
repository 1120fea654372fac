use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::strategy_core::StrategyCore;
use crate::types::TickResult;

/// What a `LiveController::stop` request asks the driver loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop soliciting new proposals, but keep ticking until any open
    /// signal reaches a terminal state.
    Graceful,
    /// Exit the loop on the next iteration regardless of open signals.
    Hard,
}

/// External handle used to request a stop from outside the driver's task.
#[derive(Clone)]
pub struct LiveController {
    tx: watch::Sender<Option<StopMode>>,
}

impl LiveController {
    pub fn stop(&self, mode: StopMode) {
        let _ = self.tx.send(Some(mode));
    }
}

/// Drives a single `StrategyCore` forever at a fixed poll interval, until a
/// hard stop is requested or a graceful stop drains to a terminal state.
/// Rehydrates once at startup so a restart resumes any in-flight signal.
pub struct LiveDriver {
    core: StrategyCore,
    poll_interval: StdDuration,
    stop_rx: watch::Receiver<Option<StopMode>>,
}

impl LiveDriver {
    /// Returns the driver paired with the `LiveController` used to signal it.
    pub fn new(core: StrategyCore, poll_interval: StdDuration) -> (Self, LiveController) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                core,
                poll_interval,
                stop_rx: rx,
            },
            LiveController { tx },
        )
    }

    /// Runs until a hard stop is requested, or a graceful stop has been
    /// requested and the strategy no longer has an open signal. Returns the
    /// sequence of terminal (`closed`/`cancelled`) results observed, mainly
    /// for test assertions; the production caller typically ignores it and
    /// instead consumes `EventBus` subscriptions.
    pub async fn run(&mut self) -> anyhow::Result<Vec<TickResult>> {
        self.core.rehydrate().await?;
        let mut terminal_results = Vec::new();

        loop {
            match *self.stop_rx.borrow() {
                Some(StopMode::Hard) => {
                    info!(strategy = self.core.strategy_name(), "live driver hard stop");
                    return Ok(terminal_results);
                }
                // Stop soliciting new proposals *before* this tick runs, so
                // step 4 of the tick algorithm is skipped and only an
                // already-open signal is driven to closure.
                Some(StopMode::Graceful) => self.core.stop(),
                None => {}
            }

            let now = Utc::now();
            match self.core.tick(now).await {
                Ok(result) => {
                    if result.is_terminal() {
                        terminal_results.push(result);
                    }
                }
                Err(err) => {
                    error!(strategy = self.core.strategy_name(), error = %err, "tick failed");
                }
            }

            if self.core.is_stopped() && !self.core.has_open_signal() {
                info!(strategy = self.core.strategy_name(), "live driver drained to idle, stopping");
                return Ok(terminal_results);
            }

            if let Err(err) = self.wait_next_poll().await {
                warn!(strategy = self.core.strategy_name(), error = %err, "stop watch closed unexpectedly");
                return Ok(terminal_results);
            }
        }
    }

    /// Sleeps for the poll interval, but wakes early if a hard stop arrives
    /// mid-sleep so the loop doesn't block an urgent shutdown.
    async fn wait_next_poll(&mut self) -> anyhow::Result<()> {
        tokio::select! {
            _ = sleep(self.poll_interval) => Ok(()),
            changed = self.stop_rx.changed() => {
                changed?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::event_bus::EventBus;
    use crate::exchange::ExchangeProvider;
    use crate::generator::SignalGenerator;
    use crate::position_store::NoopPositionStore;
    use crate::risk_gate::{RiskGate, RiskProfile};
    use crate::strategy_core::StrategyCoreBuilder;
    use crate::types::{Candle, Direction, Interval, Proposal, ProposalInterval, Symbol};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc as ChronoUtc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct FlatExchange;

    #[async_trait]
    impl ExchangeProvider for FlatExchange {
        async fn get_candles(
            &self,
            _symbol: &Symbol,
            _interval: Interval,
            since: DateTime<ChronoUtc>,
            _limit: usize,
        ) -> anyhow::Result<Vec<Candle>> {
            Ok(vec![Candle {
                open_time: since,
                open: dec!(100),
                high: dec!(100),
                low: dec!(100),
                close: dec!(100),
                volume: dec!(1),
            }])
        }

        fn format_price(&self, _symbol: &Symbol, price: Decimal) -> String {
            price.to_string()
        }

        fn format_quantity(&self, _symbol: &Symbol, quantity: Decimal) -> String {
            quantity.to_string()
        }
    }

    struct SilentGenerator;

    #[async_trait]
    impl SignalGenerator for SilentGenerator {
        async fn generate(&self, _symbol: &Symbol, _now: DateTime<ChronoUtc>) -> anyhow::Result<Option<Proposal>> {
            Ok(None)
        }
    }

    fn build_core() -> StrategyCore {
        StrategyCoreBuilder {
            symbol: Symbol::new("ETHUSDT"),
            strategy_name: "idle-loop".into(),
            exchange_name: "fixture".into(),
            frame_name: "live".into(),
            proposal_interval: ProposalInterval::M1,
            backtest: false,
            config: Arc::new(KernelConfig::default()),
            exchange: Arc::new(FlatExchange),
            risk_gate: Arc::new(RiskGate::new(RiskProfile::new("default"))),
            position_store: Arc::new(NoopPositionStore),
            event_bus: Arc::new(EventBus::new()),
            generator: Arc::new(SilentGenerator),
        }
        .build()
    }

    #[tokio::test]
    async fn hard_stop_exits_immediately_without_waiting_for_poll() {
        let core = build_core();
        let (mut driver, controller) = LiveDriver::new(core, StdDuration::from_secs(60));

        controller.stop(StopMode::Hard);
        let results = tokio::time::timeout(StdDuration::from_secs(2), driver.run())
            .await
            .expect("run should return promptly on hard stop")
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn graceful_stop_with_no_open_signal_drains_immediately() {
        let core = build_core();
        let (mut driver, controller) = LiveDriver::new(core, StdDuration::from_millis(10));

        controller.stop(StopMode::Graceful);
        let results = tokio::time::timeout(StdDuration::from_secs(2), driver.run())
            .await
            .expect("graceful stop with no open signal should drain on first tick")
            .unwrap();
        assert!(results.is_empty());
    }
}
