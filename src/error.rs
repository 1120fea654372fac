use thiserror::Error;

/// Error taxonomy (kinds, not names). Risk rejection is
/// deliberately absent here — it is a first-class event, not an error.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("signal validation failed: {0}")]
    Validation(String),

    #[error("candle fetch failed after {attempts} attempts: {source}")]
    TransientFetch {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("signal generator failed: {0}")]
    GeneratorFailure(String),

    #[error("position store write failed: {0}")]
    Persistence(String),

    #[error("logic invariant violated: {0}")]
    LogicInvariant(String),
}

impl KernelError {
    /// Logic-invariant failures are fatal to the current (strategy, symbol)
    /// loop; everything else is recoverable and only published to `error`.
    pub fn is_fatal_to_loop(&self) -> bool {
        matches!(self, KernelError::LogicInvariant(_))
    }
}
