use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// `true` if `price` has moved in the favorable direction relative to `from`.
    pub fn favorable(&self, from: Decimal, price: Decimal) -> bool {
        match self {
            Direction::Long => price > from,
            Direction::Short => price < from,
        }
    }
}

/// A single executed partial close, recorded in a signal's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialClose {
    pub kind: PartialKind,
    pub percent: Decimal,
    pub price: Decimal,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialKind {
    Profit,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TimeExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Timeout,
    PriceReject,
    User,
}

/// Caller-supplied proposal from the external `SignalGenerator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub direction: Direction,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    pub minute_estimated_time: i64,
    /// Absence means immediate market entry; presence means scheduled limit entry.
    pub price_open: Option<Decimal>,
    pub id: Option<String>,
    pub note: Option<String>,
}

/// A proposed or active trade intention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub direction: Direction,
    pub price_open: Decimal,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    /// Set only when the proposal requested a limit entry; presence means the
    /// signal starts life `Scheduled` rather than immediately `Pending`.
    pub price_open_requested: Option<Decimal>,
    pub minute_estimated_time: i64,
    pub scheduled_at: DateTime<Utc>,
    pub pending_at: DateTime<Utc>,
    pub symbol: Symbol,
    pub strategy_name: String,
    pub exchange_name: String,
    pub frame_name: String,
    pub note: Option<String>,

    pub trailing_stop_loss: Option<Decimal>,
    pub trailing_take_profit: Option<Decimal>,

    pub partial_closes: Vec<PartialClose>,
}

impl Signal {
    pub fn from_proposal(
        proposal: &Proposal,
        symbol: Symbol,
        strategy_name: impl Into<String>,
        exchange_name: impl Into<String>,
        frame_name: impl Into<String>,
        now: DateTime<Utc>,
        immediate_price_open: Decimal,
    ) -> Self {
        let id = proposal.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let price_open = proposal.price_open.unwrap_or(immediate_price_open);
        Self {
            id,
            direction: proposal.direction,
            price_open,
            price_take_profit: proposal.price_take_profit,
            price_stop_loss: proposal.price_stop_loss,
            price_open_requested: proposal.price_open,
            minute_estimated_time: proposal.minute_estimated_time,
            scheduled_at: now,
            pending_at: now,
            symbol,
            strategy_name: strategy_name.into(),
            exchange_name: exchange_name.into(),
            frame_name: frame_name.into(),
            note: proposal.note.clone(),
            trailing_stop_loss: None,
            trailing_take_profit: None,
            partial_closes: Vec::new(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.price_open_requested.is_some() && self.pending_at == self.scheduled_at && self.trailing_stop_loss.is_none()
            && self.trailing_take_profit.is_none()
            && !self.has_activated()
    }

    /// A scheduled signal is considered activated once `pendingAt` has been
    /// moved forward of `scheduledAt` by `StrategyCore::activate`.
    pub fn has_activated(&self) -> bool {
        self.pending_at > self.scheduled_at
    }

    pub fn effective_take_profit(&self) -> Decimal {
        self.trailing_take_profit.unwrap_or(self.price_take_profit)
    }

    pub fn effective_stop_loss(&self) -> Decimal {
        self.trailing_stop_loss.unwrap_or(self.price_stop_loss)
    }

    pub fn cumulative_partial_percent(&self) -> Decimal {
        self.partial_closes.iter().map(|p| p.percent).sum()
    }

    /// Directional ordering invariant: for long,
    /// `take_profit > open > stop_loss`; for short, the reverse.
    pub fn directionally_valid(&self) -> bool {
        match self.direction {
            Direction::Long => self.price_take_profit > self.price_open && self.price_open > self.price_stop_loss,
            Direction::Short => self.price_take_profit < self.price_open && self.price_open < self.price_stop_loss,
        }
    }
}
