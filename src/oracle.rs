use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::config::KernelConfig;
use crate::exchange::ExchangeProvider;
use crate::types::{Candle, Interval, Symbol};

/// Derives a VWAP reference price from recent 1-minute candles, and fetches
/// past-only / future-only candle windows relative to the execution clock.
/// The single mechanism preventing look-ahead bias: the oracle refuses to
/// fabricate future candles past real wall-clock "now" in live mode.
pub struct PriceOracle {
    exchange: Arc<dyn ExchangeProvider>,
    config: Arc<KernelConfig>,
}

impl PriceOracle {
    pub fn new(exchange: Arc<dyn ExchangeProvider>, config: Arc<KernelConfig>) -> Self {
        Self { exchange, config }
    }

    /// Returns up to `count` most recent candles whose timestamp `<= now`.
    pub async fn candles_before(
        &self,
        symbol: &Symbol,
        interval: Interval,
        now: DateTime<Utc>,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let since = now - interval.duration() * (count as i32 + 1);
        let mut candles = self.fetch_with_retry(symbol, interval, since, count * 2 + 1).await?;
        candles.retain(|c| c.open_time <= now);
        if candles.len() > count {
            let start = candles.len() - count;
            candles = candles[start..].to_vec();
        }
        if candles.len() < count {
            warn!(
                symbol = %symbol,
                requested = count,
                got = candles.len(),
                "fewer candles returned than requested"
            );
        }
        Ok(candles)
    }

    /// Returns up to `count` future candles starting at `now`. In live mode
    /// the caller-provided `real_now` bounds the window: candles whose
    /// timestamp would exceed real wall-clock "now" are never fabricated —
    /// an empty result is returned instead of padding.
    pub async fn candles_after(
        &self,
        symbol: &Symbol,
        interval: Interval,
        now: DateTime<Utc>,
        count: usize,
        real_now: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Candle>> {
        if let Some(real_now) = real_now {
            let window_end = now + interval.duration() * (count as i32);
            if window_end > real_now {
                return Ok(Vec::new());
            }
        }
        let candles = self.fetch_with_retry(symbol, interval, now, count).await?;
        Ok(candles)
    }

    /// VWAP over the last `avg_price_candle_count` 1-minute candles (spec
    /// window: `typical = (high + low + close) / 3`, weighted by volume.
    /// Falls back to an arithmetic mean of `close` if total volume is zero.
    pub async fn average_price(&self, symbol: &Symbol, now: DateTime<Utc>) -> anyhow::Result<Decimal> {
        let candles = self
            .candles_before(symbol, Interval::M1, now, self.config.avg_price_candle_count)
            .await?;
        Ok(vwap(&candles))
    }

    async fn fetch_with_retry(
        &self,
        symbol: &Symbol,
        interval: Interval,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let mut last_err = None;
        for attempt in 1..=self.config.candle_retry_count {
            match self.exchange.get_candles(symbol, interval, since, limit).await {
                Ok(candles) => return Ok(candles),
                Err(e) => {
                    warn!(symbol = %symbol, attempt, "candle fetch failed, retrying");
                    last_err = Some(e);
                    if attempt < self.config.candle_retry_count {
                        tokio::time::sleep(StdDuration::from_millis(self.config.candle_retry_delay_ms)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("candle fetch failed with no recorded error")))
    }
}

/// VWAP formula as a free function so `StrategyCore::simulate_backtest`
/// can reuse it for the rolling-window fast-forward path without an
/// oracle/exchange round-trip.
pub fn vwap(candles: &[Candle]) -> Decimal {
    let total_volume: Decimal = candles.iter().map(|c| c.volume).sum();
    if total_volume.is_zero() {
        if candles.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = candles.iter().map(|c| c.close).sum();
        return sum / Decimal::from(candles.len());
    }
    let weighted: Decimal = candles.iter().map(|c| c.typical_price() * c.volume).sum();
    weighted / total_volume
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle_at(minute: i64, close: Decimal, volume: Decimal) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle {
            open_time: base + chrono::Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn vwap_weights_by_volume() {
        let candles = vec![candle_at(0, dec!(100), dec!(1)), candle_at(1, dec!(200), dec!(3))];
        // typical == close since high == low == close here.
        // weighted = 100*1 + 200*3 = 700; total vol = 4 => 175
        assert_eq!(vwap(&candles), dec!(175));
    }

    #[test]
    fn vwap_falls_back_to_mean_close_when_volume_zero() {
        let candles = vec![candle_at(0, dec!(100), Decimal::ZERO), candle_at(1, dec!(200), Decimal::ZERO)];
        assert_eq!(vwap(&candles), dec!(150));
    }

    #[test]
    fn vwap_empty_is_zero() {
        assert_eq!(vwap(&[]), Decimal::ZERO);
    }
}
