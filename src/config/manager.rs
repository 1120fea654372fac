use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use super::kernel::KernelConfig;

#[derive(Debug, Clone)]
pub enum ConfigChangeEvent {
    Updated,
}

/// Holds the live `KernelConfig` behind an `Arc<RwLock<_>>` and publishes a
/// change notification on successful update, rolling back on validation
/// failure.
pub struct ConfigManager {
    config: Arc<RwLock<KernelConfig>>,
    change_tx: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigManager {
    pub fn new(initial: KernelConfig) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self {
            config: Arc::new(RwLock::new(initial)),
            change_tx,
        }
    }

    pub async fn get(&self) -> KernelConfig {
        self.config.read().await.clone()
    }

    pub fn config_arc(&self) -> Arc<RwLock<KernelConfig>> {
        Arc::clone(&self.config)
    }

    /// Validates the candidate config; on failure the prior config is left
    /// untouched and the accumulated error list is returned.
    pub async fn update(&self, candidate: KernelConfig) -> Result<(), Vec<String>> {
        candidate.validate()?;

        let mut config = self.config.write().await;
        *config = candidate;
        drop(config);

        info!("kernel configuration updated");
        let _ = self.change_tx.send(ConfigChangeEvent::Updated);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_tx.subscribe()
    }
}
