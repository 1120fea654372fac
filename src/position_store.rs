use async_trait::async_trait;

use crate::types::{Signal, Symbol};

/// Identifies one `(strategy, symbol)` slot pair in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub strategy_name: String,
    pub symbol: Symbol,
}

impl PositionKey {
    pub fn new(strategy_name: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            symbol,
        }
    }

    fn pending_tree_key(&self) -> Vec<u8> {
        format!("pending/{}/{}", self.strategy_name, self.symbol).into_bytes()
    }

    fn scheduled_tree_key(&self) -> Vec<u8> {
        format!("scheduled/{}/{}", self.strategy_name, self.symbol).into_bytes()
    }
}

/// Durable key-value snapshot of at most one pending and one scheduled
/// signal per `(strategy, symbol)`. Every write must be atomic — a crashed
/// process leaves either the old or the new state, never a torn record.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn read_pending(&self, key: &PositionKey) -> anyhow::Result<Option<Signal>>;
    async fn read_scheduled(&self, key: &PositionKey) -> anyhow::Result<Option<Signal>>;
    async fn write_pending(&self, key: &PositionKey, signal: Option<&Signal>) -> anyhow::Result<()>;
    async fn write_scheduled(&self, key: &PositionKey, signal: Option<&Signal>) -> anyhow::Result<()>;
    async fn clear(&self, key: &PositionKey) -> anyhow::Result<()>;
}

/// Disk-backed implementation. `sled` already guarantees that a single
/// `insert`/`remove` either lands fully or not at all even across a crash;
/// `flush_async` after each transition forces the write to durable storage
/// before the caller proceeds to the next tick.
pub struct SledPositionStore {
    db: sled::Db,
}

impl SledPositionStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    async fn write_slot(&self, tree_key: Vec<u8>, signal: Option<&Signal>) -> anyhow::Result<()> {
        match signal {
            Some(signal) => {
                let bytes = serde_json::to_vec(signal)?;
                self.db.insert(tree_key, bytes)?;
            }
            None => {
                self.db.remove(tree_key)?;
            }
        }
        self.db.flush_async().await?;
        Ok(())
    }

    fn read_slot(&self, tree_key: Vec<u8>) -> anyhow::Result<Option<Signal>> {
        match self.db.get(tree_key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PositionStore for SledPositionStore {
    async fn read_pending(&self, key: &PositionKey) -> anyhow::Result<Option<Signal>> {
        self.read_slot(key.pending_tree_key())
    }

    async fn read_scheduled(&self, key: &PositionKey) -> anyhow::Result<Option<Signal>> {
        self.read_slot(key.scheduled_tree_key())
    }

    async fn write_pending(&self, key: &PositionKey, signal: Option<&Signal>) -> anyhow::Result<()> {
        self.write_slot(key.pending_tree_key(), signal).await
    }

    async fn write_scheduled(&self, key: &PositionKey, signal: Option<&Signal>) -> anyhow::Result<()> {
        self.write_slot(key.scheduled_tree_key(), signal).await
    }

    async fn clear(&self, key: &PositionKey) -> anyhow::Result<()> {
        self.write_pending(key, None).await?;
        self.write_scheduled(key, None).await?;
        Ok(())
    }
}

/// Backtests must not touch persistent state: every write is a no-op and
/// every read returns `None`. `StrategySession` already holds the
/// authoritative in-memory state for a backtest run, so this adapter exists
/// purely to satisfy the `PositionStore` contract at the call sites shared
/// with live mode.
#[derive(Default)]
pub struct NoopPositionStore;

#[async_trait]
impl PositionStore for NoopPositionStore {
    async fn read_pending(&self, _key: &PositionKey) -> anyhow::Result<Option<Signal>> {
        Ok(None)
    }

    async fn read_scheduled(&self, _key: &PositionKey) -> anyhow::Result<Option<Signal>> {
        Ok(None)
    }

    async fn write_pending(&self, _key: &PositionKey, _signal: Option<&Signal>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write_scheduled(&self, _key: &PositionKey, _signal: Option<&Signal>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clear(&self, _key: &PositionKey) -> anyhow::Result<()> {
        Ok(())
    }
}
