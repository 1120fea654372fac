pub mod candle;
pub mod context;
pub mod events;
pub mod signal;
pub mod symbol;

pub use candle::*;
pub use context::*;
pub use events::*;
pub use signal::*;
pub use symbol::*;
