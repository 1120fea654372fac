use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::exchange::ExchangeProvider;
use crate::types::{Candle, Interval, Symbol};

/// Synthesizes OHLCV candles from a deterministic sine wave seeded off the
/// symbol's name and the candle's minute offset — no network, no clock
/// dependency beyond the requested `since` timestamp, so two runs against
/// the same arguments always produce byte-identical candles.
pub struct DeterministicExchange {
    base_price: Decimal,
    amplitude: Decimal,
}

impl DeterministicExchange {
    pub fn new(base_price: Decimal, amplitude: Decimal) -> Self {
        Self { base_price, amplitude }
    }

    fn seed(symbol: &Symbol) -> f64 {
        symbol.as_str().bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64)) as f64
    }
}

impl Default for DeterministicExchange {
    fn default() -> Self {
        Self::new(Decimal::from(100), Decimal::from(2))
    }
}

#[async_trait]
impl ExchangeProvider for DeterministicExchange {
    async fn get_candles(&self, symbol: &Symbol, interval: Interval, since: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let seed = Self::seed(symbol);
        let step = interval.duration();
        let amplitude = self.amplitude.to_string().parse::<f64>().unwrap_or(2.0);
        let base = self.base_price.to_string().parse::<f64>().unwrap_or(100.0);

        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let open_time = since + step * i as i32;
            let phase = seed + i as f64 * 0.15;
            let mid = base + amplitude * phase.sin();
            let wobble = amplitude * 0.1;

            let open = decimal_from_f64(mid - wobble * 0.5);
            let close = decimal_from_f64(mid + wobble * 0.5);
            let high = decimal_from_f64(mid + wobble);
            let low = decimal_from_f64(mid - wobble);
            let volume = decimal_from_f64(10.0 + (phase.cos().abs()) * 5.0);

            candles.push(Candle { open_time, open, high, low, close, volume });
        }
        Ok(candles)
    }

    fn format_price(&self, _symbol: &Symbol, price: Decimal) -> String {
        format!("{:.2}", price)
    }

    fn format_quantity(&self, _symbol: &Symbol, quantity: Decimal) -> String {
        format!("{:.4}", quantity)
    }
}

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO).round_dp(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_arguments_yield_identical_candles() {
        let exchange = DeterministicExchange::default();
        let symbol = Symbol::new("BTCUSDT");
        let since = Utc::now();

        let first = exchange.get_candles(&symbol, Interval::M1, since, 20).await.unwrap();
        let second = exchange.get_candles(&symbol, Interval::M1, since, 20).await.unwrap();

        assert_eq!(first.len(), 20);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.open, b.open);
            assert_eq!(a.close, b.close);
            assert_eq!(a.high, b.high);
            assert_eq!(a.low, b.low);
        }
    }

    #[tokio::test]
    async fn every_candle_is_well_formed() {
        let exchange = DeterministicExchange::default();
        let symbol = Symbol::new("ETHUSDT");
        let candles = exchange.get_candles(&symbol, Interval::M5, Utc::now(), 50).await.unwrap();
        assert!(candles.iter().all(|c| c.is_well_formed()));
    }
}
