//! Deterministic in-memory `ExchangeProvider`/`SignalGenerator` pair used as
//! the CLI binary's default wiring: no network, no external exchange, fully
//! reproducible runs for dry-runs and documentation.

mod exchange;
mod generator;

pub use exchange::DeterministicExchange;
pub use generator::DeterministicSignalGenerator;
