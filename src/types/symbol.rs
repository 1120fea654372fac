use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque trading symbol. The kernel never special-cases a symbol's identity;
/// all symbol-specific behavior (precision, correlation groups, tick size)
/// lives in the caller's `ExchangeProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Interval codes the `ExchangeProvider` contract is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::M1 => Duration::minutes(1),
            Interval::M3 => Duration::minutes(3),
            Interval::M5 => Duration::minutes(5),
            Interval::M15 => Duration::minutes(15),
            Interval::M30 => Duration::minutes(30),
            Interval::H1 => Duration::hours(1),
            Interval::H2 => Duration::hours(2),
            Interval::H4 => Duration::hours(4),
            Interval::H6 => Duration::hours(6),
            Interval::H8 => Duration::hours(8),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The strategy generator's proposal cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalInterval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
}

impl ProposalInterval {
    pub fn duration(&self) -> Duration {
        match self {
            ProposalInterval::M1 => Duration::minutes(1),
            ProposalInterval::M3 => Duration::minutes(3),
            ProposalInterval::M5 => Duration::minutes(5),
            ProposalInterval::M15 => Duration::minutes(15),
            ProposalInterval::M30 => Duration::minutes(30),
            ProposalInterval::H1 => Duration::hours(1),
        }
    }
}

/// A backtest timeframe descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub interval: Interval,
}

impl Frame {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>, interval: Interval) -> anyhow::Result<Self> {
        if start_date >= end_date {
            anyhow::bail!("Frame: start_date must be before end_date");
        }
        Ok(Self { start_date, end_date, interval })
    }

    /// Produces the finite ordered sequence of timestamps spaced by `interval`.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let step = self.interval.duration();
        let mut out = Vec::new();
        let mut t = self.start_date;
        while t < self.end_date {
            out.push(t);
            t += step;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frame_rejects_inverted_range() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Frame::new(t, t, Interval::M1).is_err());
    }

    #[test]
    fn frame_timestamps_spaced_by_interval() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::minutes(5);
        let frame = Frame::new(start, end, Interval::M1).unwrap();
        let ts = frame.timestamps();
        assert_eq!(ts.len(), 5);
        assert_eq!(ts[0], start);
        assert_eq!(ts[4], start + Duration::minutes(4));
    }
}
