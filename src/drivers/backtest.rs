use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::exchange::ExchangeProvider;
use crate::strategy_core::StrategyCore;
use crate::types::{Frame, Interval, Symbol, TickResult};

/// Async pull-iterator over a backtest `Frame`: repeatedly calls `tick` at
/// each timeframe instant, fast-forwarding through `simulateBacktest` the
/// moment a signal opens. Fully consumer-driven — nothing runs until
/// `next()` is called, and the consumer may stop pulling at any time.
pub struct BacktestDriver {
    core: StrategyCore,
    exchange: Arc<dyn ExchangeProvider>,
    symbol: Symbol,
    timestamps: Vec<DateTime<Utc>>,
    index: usize,
}

impl BacktestDriver {
    pub fn new(core: StrategyCore, exchange: Arc<dyn ExchangeProvider>, frame: &Frame) -> Self {
        let symbol = core.symbol().clone();
        Self {
            core,
            exchange,
            symbol,
            timestamps: frame.timestamps(),
            index: 0,
        }
    }

    /// Consumes the timeframe array one step (or one fast-forward jump) at a
    /// time, returning `Ok(None)` once exhausted. Only `scheduled`, `opened`
    /// (after its fast-forward resolves), `closed`, and `cancelled` results
    /// are yielded; `idle`/`active` passes are consumed internally.
    pub async fn next(&mut self) -> anyhow::Result<Option<TickResult>> {
        loop {
            if self.index >= self.timestamps.len() {
                return Ok(None);
            }
            let now = self.timestamps[self.index];
            let result = self.core.tick(now).await?;

            match result {
                TickResult::Opened { signal } => {
                    let count = (signal.minute_estimated_time as usize).max(1);
                    let candles = self
                        .exchange
                        .get_candles(&self.symbol, Interval::M1, now, count)
                        .await?;
                    if candles.is_empty() {
                        // No future data to fast-forward against: terminate per spec 4.8c.
                        return Ok(None);
                    }
                    let closed = self.core.simulate_backtest(&candles).await?;
                    if let TickResult::Closed { close_timestamp, .. } = &closed {
                        self.advance_past(*close_timestamp);
                    } else {
                        self.index += 1;
                    }
                    return Ok(Some(closed));
                }
                TickResult::Closed { close_timestamp, .. } => {
                    self.advance_past(close_timestamp);
                    return Ok(Some(result));
                }
                TickResult::Scheduled { .. } | TickResult::Cancelled { .. } => {
                    self.index += 1;
                    return Ok(Some(result));
                }
                TickResult::Idle | TickResult::Active { .. } => {
                    self.index += 1;
                    continue;
                }
            }
        }
    }

    /// Skips every remaining index whose timestamp is `<= close_ts`, so the
    /// next pull resumes strictly after the close.
    fn advance_past(&mut self, close_ts: DateTime<Utc>) {
        while self.index < self.timestamps.len() && self.timestamps[self.index] <= close_ts {
            self.index += 1;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::event_bus::EventBus;
    use crate::generator::SignalGenerator;
    use crate::position_store::NoopPositionStore;
    use crate::risk_gate::{RiskGate, RiskProfile};
    use crate::strategy_core::StrategyCoreBuilder;
    use crate::types::{Candle, Direction, Proposal, ProposalInterval};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    struct FixtureExchange {
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl ExchangeProvider for FixtureExchange {
        async fn get_candles(
            &self,
            _symbol: &Symbol,
            _interval: Interval,
            since: DateTime<Utc>,
            limit: usize,
        ) -> anyhow::Result<Vec<Candle>> {
            let mut out: Vec<Candle> = self.candles.iter().filter(|c| c.open_time >= since).cloned().collect();
            out.truncate(limit.max(1) * 3);
            Ok(out)
        }

        fn format_price(&self, _symbol: &Symbol, price: Decimal) -> String {
            price.to_string()
        }

        fn format_quantity(&self, _symbol: &Symbol, quantity: Decimal) -> String {
            quantity.to_string()
        }
    }

    /// Proposes exactly once, then stays silent — enough to drive a single
    /// signal through a `BacktestDriver` pull loop.
    struct OneShotGenerator {
        proposal: Mutex<Option<Proposal>>,
    }

    #[async_trait]
    impl SignalGenerator for OneShotGenerator {
        async fn generate(&self, _symbol: &Symbol, _now: DateTime<Utc>) -> anyhow::Result<Option<Proposal>> {
            Ok(self.proposal.lock().await.take())
        }
    }

    fn candle_at(base: DateTime<Utc>, minute: i64, close: Decimal) -> Candle {
        Candle {
            open_time: base + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[tokio::test]
    async fn s1_long_take_profit_fast_forwards_to_a_single_closed_result() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Flat setup candles, then a linear ramp crossing TP (101) within the window.
        let mut candles = vec![candle_at(base, 0, dec!(100)); 5];
        for (i, c) in candles.iter_mut().enumerate() {
            c.open_time = base + Duration::minutes(i as i64);
        }
        for i in 0..10 {
            candles.push(candle_at(base, 5 + i, dec!(100) + Decimal::from(i + 1) * dec!(0.3)));
        }

        let exchange: Arc<dyn ExchangeProvider> = Arc::new(FixtureExchange { candles });
        let config = Arc::new(KernelConfig::default());
        let event_bus = Arc::new(EventBus::new());
        let risk_gate = Arc::new(RiskGate::new(RiskProfile::new("default")));
        let position_store = Arc::new(NoopPositionStore);
        let generator: Arc<dyn SignalGenerator> = Arc::new(OneShotGenerator {
            proposal: Mutex::new(Some(Proposal {
                direction: Direction::Long,
                price_take_profit: dec!(101),
                price_stop_loss: dec!(99),
                minute_estimated_time: 60,
                price_open: None,
                id: None,
                note: None,
            })),
        });

        let core = StrategyCoreBuilder {
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "trend".into(),
            exchange_name: "fixture".into(),
            frame_name: "frame-1".into(),
            proposal_interval: ProposalInterval::M1,
            backtest: true,
            config,
            exchange,
            risk_gate,
            position_store,
            event_bus,
            generator,
        }
        .build();

        let frame = Frame::new(base, base + Duration::minutes(30), Interval::M1).unwrap();
        let exchange_for_driver: Arc<dyn ExchangeProvider> = Arc::new(FixtureExchange {
            candles: {
                let mut c = vec![candle_at(base, 0, dec!(100)); 5];
                for (i, cc) in c.iter_mut().enumerate() {
                    cc.open_time = base + Duration::minutes(i as i64);
                }
                for i in 0..10 {
                    c.push(candle_at(base, 5 + i, dec!(100) + Decimal::from(i + 1) * dec!(0.3)));
                }
                c
            },
        });
        let mut driver = BacktestDriver::new(core, exchange_for_driver, &frame);

        let mut closed_count = 0;
        while let Some(result) = driver.next().await.unwrap() {
            if let TickResult::Closed { close_reason, .. } = result {
                closed_count += 1;
                assert_eq!(close_reason, crate::types::CloseReason::TakeProfit);
            }
        }
        assert_eq!(closed_count, 1);
    }
}
