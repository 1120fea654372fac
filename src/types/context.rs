/// Execution mode — backtest ticks walk a synthetic clock; live ticks walk
/// wall-clock time. `PriceOracle` uses this to refuse to fabricate future
/// candles. Passed explicitly wherever a call needs it (e.g.
/// `RiskGateRegistry::gate`) rather than threaded through ambient
/// task-local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Backtest,
    Live,
}
