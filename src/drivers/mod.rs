pub mod backtest;
pub mod live;
pub mod walker;

pub use backtest::BacktestDriver;
pub use live::{LiveController, LiveDriver, StopMode};
pub use walker::{WalkerCancelToken, WalkerDriver, WalkerMetric};
