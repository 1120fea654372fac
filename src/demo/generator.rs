use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::generator::SignalGenerator;
use crate::types::{Direction, Proposal, Symbol};

/// Proposes a long entry every `period_minutes` on the wall clock, with
/// absolute take-profit/stop-loss levels fixed around `DeterministicExchange`'s
/// default price band — deterministic, no external state, useful only for
/// dry-running the drivers end to end.
pub struct DeterministicSignalGenerator {
    period_minutes: i64,
    price_take_profit: Decimal,
    price_stop_loss: Decimal,
    estimated_minutes: i64,
}

impl DeterministicSignalGenerator {
    pub fn new(period_minutes: i64, price_take_profit: Decimal, price_stop_loss: Decimal, estimated_minutes: i64) -> Self {
        Self {
            period_minutes,
            price_take_profit,
            price_stop_loss,
            estimated_minutes,
        }
    }
}

impl Default for DeterministicSignalGenerator {
    fn default() -> Self {
        Self::new(15, Decimal::from(102), Decimal::from(98), 60)
    }
}

#[async_trait]
impl SignalGenerator for DeterministicSignalGenerator {
    async fn generate(&self, _symbol: &Symbol, now: DateTime<Utc>) -> anyhow::Result<Option<Proposal>> {
        if self.period_minutes <= 0 || now.timestamp() % (self.period_minutes * 60) != 0 {
            return Ok(None);
        }

        Ok(Some(Proposal {
            direction: Direction::Long,
            price_take_profit: self.price_take_profit,
            price_stop_loss: self.price_stop_loss,
            minute_estimated_time: self.estimated_minutes,
            price_open: None,
            id: None,
            note: Some("deterministic demo proposal".into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn fires_only_on_period_boundary() {
        let generator = DeterministicSignalGenerator::default();
        let symbol = Symbol::new("BTCUSDT");

        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap();
        let off_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 0, 16, 0).unwrap();

        assert!(generator.generate(&symbol, on_boundary).await.unwrap().is_some());
        assert!(generator.generate(&symbol, off_boundary).await.unwrap().is_none());
    }
}
