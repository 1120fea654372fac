use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::KernelConfig;
use crate::types::{Direction, Signal};

/// Everything `SignalValidator` needs beyond the signal itself — the
/// ambient ids augmented onto the proposal before validation. `Signal`
/// already carries `symbol`/`strategy_name`/`exchange_name`, so this just
/// carries config and the current timestamp.
pub struct ValidationContext<'a> {
    pub config: &'a KernelConfig,
    pub now: DateTime<Utc>,
}

/// Pure synchronous validation. Every rule is checked — failures
/// accumulate rather than short-circuit, so the caller sees every violation
/// in one pass instead of retrying proposal-by-proposal.
pub fn validate_signal(signal: &Signal, ctx: &ValidationContext) -> Result<(), String> {
    let mut errors = Vec::new();

    // Rule 2: all price fields finite and positive.
    for (name, value) in [
        ("price_open", signal.price_open),
        ("price_take_profit", signal.price_take_profit),
        ("price_stop_loss", signal.price_stop_loss),
    ] {
        if value <= Decimal::ZERO {
            errors.push(format!("{name} must be a finite positive number, got {value}"));
        }
    }

    // Rule 3: directional ordering. Only checked when prices are sane enough
    // to compare meaningfully; otherwise rule 2's message already explains it.
    if signal.price_open > Decimal::ZERO
        && signal.price_take_profit > Decimal::ZERO
        && signal.price_stop_loss > Decimal::ZERO
        && !signal.directionally_valid()
    {
        match signal.direction {
            Direction::Long => errors.push(format!(
                "long signal requires take_profit ({}) > open ({}) > stop_loss ({})",
                signal.price_take_profit, signal.price_open, signal.price_stop_loss
            )),
            Direction::Short => errors.push(format!(
                "short signal requires take_profit ({}) < open ({}) < stop_loss ({})",
                signal.price_take_profit, signal.price_open, signal.price_stop_loss
            )),
        }
    }

    // Rule 4: TP/SL distance bounds.
    if signal.price_open > Decimal::ZERO {
        let tp_distance = (signal.price_take_profit - signal.price_open).abs() / signal.price_open;
        if tp_distance < ctx.config.min_tp_distance {
            errors.push(format!(
                "take-profit distance {tp_distance} below minimum {}",
                ctx.config.min_tp_distance
            ));
        }
        let sl_distance = (signal.price_stop_loss - signal.price_open).abs() / signal.price_open;
        if sl_distance > ctx.config.max_sl_distance {
            errors.push(format!(
                "stop-loss distance {sl_distance} exceeds maximum {}",
                ctx.config.max_sl_distance
            ));
        }
    }

    // Rule 5: lifetime bound.
    if signal.minute_estimated_time <= 0 {
        errors.push("minute_estimated_time must be a positive integer".to_string());
    } else if signal.minute_estimated_time > ctx.config.max_signal_lifetime_minutes {
        errors.push(format!(
            "minute_estimated_time {} exceeds maximum {}",
            signal.minute_estimated_time, ctx.config.max_signal_lifetime_minutes
        ));
    }

    // Rule 6: scheduled_at / pending_at are positive wall times.
    if signal.scheduled_at.timestamp_millis() <= 0 {
        errors.push("scheduled_at must be a positive wall-clock time".to_string());
    }
    if signal.pending_at.timestamp_millis() <= 0 {
        errors.push("pending_at must be a positive wall-clock time".to_string());
    }

    // Invariant: cumulative partial percent never exceeds 100.
    if signal.cumulative_partial_percent() > Decimal::from(100) {
        errors.push(format!(
            "cumulative partial-close percent {} exceeds 100",
            signal.cumulative_partial_percent()
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Symbol;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn base_signal(now: DateTime<Utc>) -> Signal {
        Signal {
            id: "sig-1".into(),
            direction: Direction::Long,
            price_open: dec!(100),
            price_take_profit: dec!(101),
            price_stop_loss: dec!(99),
            price_open_requested: None,
            minute_estimated_time: 60,
            scheduled_at: now,
            pending_at: now,
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "trend".into(),
            exchange_name: "demo".into(),
            frame_name: "".into(),
            note: None,
            trailing_stop_loss: None,
            trailing_take_profit: None,
            partial_closes: Vec::new(),
        }
    }

    #[test]
    fn accepts_well_formed_long_signal() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = KernelConfig::default();
        let ctx = ValidationContext { config: &config, now };
        assert!(validate_signal(&base_signal(now), &ctx).is_ok());
    }

    #[test]
    fn accumulates_multiple_failures() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = KernelConfig::default();
        let ctx = ValidationContext { config: &config, now };
        let mut signal = base_signal(now);
        signal.minute_estimated_time = -5;
        signal.price_take_profit = dec!(100.1); // below min_tp_distance (0.3%)
        let err = validate_signal(&signal, &ctx).unwrap_err();
        assert!(err.contains("minute_estimated_time"));
        assert!(err.contains("take-profit distance"));
    }

    #[test]
    fn rejects_inverted_short_signal() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = KernelConfig::default();
        let ctx = ValidationContext { config: &config, now };
        let mut signal = base_signal(now);
        signal.direction = Direction::Short;
        // Short requires tp < open < sl; leaving long-style ordering should fail.
        let err = validate_signal(&signal, &ctx).unwrap_err();
        assert!(err.contains("short signal requires"));
    }

    #[test]
    fn rejects_excessive_sl_distance() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = KernelConfig::default();
        let ctx = ValidationContext { config: &config, now };
        let mut signal = base_signal(now);
        signal.price_stop_loss = dec!(50); // 50% away, above default 20% max
        let err = validate_signal(&signal, &ctx).unwrap_err();
        assert!(err.contains("stop-loss distance"));
    }
}
