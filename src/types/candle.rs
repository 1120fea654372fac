use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV candle. The interval is context (the window it was requested under),
/// not stored on the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    /// Structural invariant: `high >= max(open, close)`, `low <= min(open, close)`.
    pub fn is_well_formed(&self) -> bool {
        self.open >= Decimal::ZERO
            && self.high >= Decimal::ZERO
            && self.low >= Decimal::ZERO
            && self.close >= Decimal::ZERO
            && self.volume >= Decimal::ZERO
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(h: i64, l: i64, c: i64, v: i64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: Decimal::from(c),
            high: Decimal::from(h),
            low: Decimal::from(l),
            close: Decimal::from(c),
            volume: Decimal::from(v),
        }
    }

    #[test]
    fn typical_price_is_hlc3() {
        let c = candle(102, 98, 100, 10);
        assert_eq!(c.typical_price(), Decimal::from(100));
    }

    #[test]
    fn malformed_candle_rejected() {
        let mut c = candle(102, 98, 100, 10);
        c.high = Decimal::from(50); // high below close: malformed
        assert!(!c.is_well_formed());
    }
}
