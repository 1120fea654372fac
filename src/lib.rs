//! Strategy execution kernel: the per-(strategy, symbol) state machine that
//! converts signal proposals into validated positions, monitors them against
//! take-profit / stop-loss / time-expiry, and drives that machine from either
//! a historical (backtest) or wall-clock (live) execution clock.
//!
//! The kernel never talks to a real exchange or writes a signal proposer —
//! both are external collaborators consumed through [`exchange::ExchangeProvider`]
//! and [`generator::SignalGenerator`].

pub mod config;
pub mod drivers;
pub mod error;
pub mod event_bus;
pub mod exchange;
pub mod generator;
pub mod oracle;
pub mod position_store;
pub mod risk_gate;
pub mod stats;
pub mod strategy_core;
pub mod trackers;
pub mod types;
pub mod validator;

pub mod demo;

pub use error::KernelError;
