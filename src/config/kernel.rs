use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Global configuration keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    pub min_tp_distance: Decimal,
    pub max_sl_distance: Decimal,
    pub max_signal_lifetime_minutes: i64,
    pub schedule_await_minutes: i64,
    pub max_signal_generation_seconds: u64,
    pub avg_price_candle_count: usize,
    pub candle_retry_count: u32,
    pub candle_retry_delay_ms: u64,
    pub slippage_percent: Decimal,
    pub fee_percent: Decimal,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            min_tp_distance: dec!(0.003),
            max_sl_distance: dec!(0.20),
            max_signal_lifetime_minutes: 1440,
            schedule_await_minutes: 120,
            max_signal_generation_seconds: 30,
            avg_price_candle_count: 5,
            candle_retry_count: 3,
            candle_retry_delay_ms: 1000,
            slippage_percent: dec!(0.001),
            fee_percent: dec!(0.001),
        }
    }
}

impl KernelConfig {
    /// Computed, not independently configurable: the round-trip cost
    /// `BreakevenTracker` arms against.
    pub fn breakeven_threshold(&self) -> Decimal {
        (self.slippage_percent + self.fee_percent) * Decimal::from(2)
    }

    /// Accumulates every violation rather than short-circuiting, mirroring
    /// the teacher's `RuntimeConfig::validate`.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.min_tp_distance <= Decimal::ZERO || self.min_tp_distance >= Decimal::ONE {
            errors.push("min_tp_distance must be between 0 and 1".to_string());
        }
        if self.max_sl_distance <= Decimal::ZERO || self.max_sl_distance >= Decimal::ONE {
            errors.push("max_sl_distance must be between 0 and 1".to_string());
        }
        if self.max_signal_lifetime_minutes <= 0 {
            errors.push("max_signal_lifetime_minutes must be > 0".to_string());
        }
        if self.schedule_await_minutes <= 0 {
            errors.push("schedule_await_minutes must be > 0".to_string());
        }
        if self.max_signal_generation_seconds == 0 {
            errors.push("max_signal_generation_seconds must be > 0".to_string());
        }
        if self.avg_price_candle_count == 0 {
            errors.push("avg_price_candle_count must be > 0".to_string());
        }
        if self.candle_retry_count == 0 {
            errors.push("candle_retry_count must be > 0".to_string());
        }
        if self.slippage_percent < Decimal::ZERO {
            errors.push("slippage_percent must be >= 0".to_string());
        }
        if self.fee_percent < Decimal::ZERO {
            errors.push("fee_percent must be >= 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(KernelConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_accumulates_all_errors() {
        let config = KernelConfig {
            max_signal_lifetime_minutes: 0,
            schedule_await_minutes: 0,
            ..KernelConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn breakeven_threshold_is_double_round_trip_cost() {
        let config = KernelConfig::default();
        assert_eq!(config.breakeven_threshold(), dec!(0.004));
    }
}
