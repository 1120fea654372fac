use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{Candle, Interval, Symbol};

/// External candle source the kernel drives through `PriceOracle` — the
/// generalization of the teacher's `Exchange` trait down to the single
/// responsibility the kernel actually needs. Order placement,
/// balances and the websocket/orderbook surface belong to a trading venue
/// adapter living outside this crate, not to the kernel.
#[async_trait]
pub trait ExchangeProvider: Send + Sync {
    /// Returns up to `limit` candles for `symbol`/`interval` with
    /// `open_time >= since`, in strictly ascending timestamp order. An
    /// implementation that cannot satisfy `limit` returns as many as it has
    /// rather than padding or erroring.
    async fn get_candles(
        &self,
        symbol: &Symbol,
        interval: Interval,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    /// Presentational price formatting (venue tick size). The kernel never
    /// depends on the result for arithmetic, only for logging/output.
    fn format_price(&self, symbol: &Symbol, price: Decimal) -> String;

    /// Presentational quantity formatting (venue lot size).
    fn format_quantity(&self, symbol: &Symbol, quantity: Decimal) -> String;
}
