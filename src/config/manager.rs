#![allow(dead_code)]
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use serde::Serialize;
use tracing::info;

use super::runtime::{
    AveragingSettings, EntrySettings, ExitSettings, GeneralSettings, RegimeSettings, RiskSettings,
    RuntimeConfig, SizingSettings, VoteSettings,
};

#[derive(Debug, Clone, Serialize)]
pub enum ConfigChangeEvent {
    VotesUpdated(VoteSettings),
    RegimeUpdated(RegimeSettings),
    EntryUpdated(EntrySettings),
    ExitsUpdated(ExitSettings),
    AveragingUpdated(AveragingSettings),
    SizingUpdated(SizingSettings),
    RiskUpdated(RiskSettings),
    GeneralUpdated(GeneralSettings),
    FullConfigUpdated,
}

/// Shared, hot-reloadable configuration. A chat-issued toggle goes through
/// one of the `update_*` methods, which validates the whole config before
/// committing so a bad value never reaches a running symbol worker; workers
/// re-read the `Arc<RwLock<RuntimeConfig>>` on their next tick.
pub struct RuntimeConfigManager {
    config: Arc<RwLock<RuntimeConfig>>,
    change_tx: broadcast::Sender<ConfigChangeEvent>,
}

macro_rules! update_section {
    ($name:ident, $field:ident, $ty:ty, $event:ident) => {
        pub async fn $name(&self, settings: $ty) -> Result<(), String> {
            let mut config = self.config.write().await;
            let old = config.$field.clone();
            config.$field = settings.clone();

            if let Err(errors) = config.validate() {
                config.$field = old;
                return Err(errors.join(", "));
            }

            let _ = self.change_tx.send(ConfigChangeEvent::$event(settings));
            Ok(())
        }
    };
}

impl RuntimeConfigManager {
    pub fn new(initial: RuntimeConfig) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self {
            config: Arc::new(RwLock::new(initial)),
            change_tx,
        }
    }

    pub async fn get_config(&self) -> RuntimeConfig {
        self.config.read().await.clone()
    }

    update_section!(update_votes, votes, VoteSettings, VotesUpdated);
    update_section!(update_regime, regime, RegimeSettings, RegimeUpdated);
    update_section!(update_entry, entry, EntrySettings, EntryUpdated);
    update_section!(update_exits, exits, ExitSettings, ExitsUpdated);
    update_section!(update_averaging, averaging, AveragingSettings, AveragingUpdated);
    update_section!(update_sizing, sizing, SizingSettings, SizingUpdated);
    update_section!(update_risk, risk, RiskSettings, RiskUpdated);

    pub async fn update_general(&self, settings: GeneralSettings) -> Result<(), String> {
        let mut config = self.config.write().await;
        config.general = settings.clone();

        info!(pairs = ?settings.enabled_pairs, timeframe = %settings.timeframe, "general settings updated");
        let _ = self.change_tx.send(ConfigChangeEvent::GeneralUpdated(settings));
        Ok(())
    }

    pub async fn update_full(&self, new_config: RuntimeConfig) -> Result<(), String> {
        if let Err(errors) = new_config.validate() {
            return Err(errors.join(", "));
        }

        let mut config = self.config.write().await;
        *config = new_config;

        info!("full configuration updated");
        let _ = self.change_tx.send(ConfigChangeEvent::FullConfigUpdated);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_tx.subscribe()
    }

    pub fn config_arc(&self) -> Arc<RwLock<RuntimeConfig>> {
        Arc::clone(&self.config)
    }
}

impl Clone for RuntimeConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            change_tx: self.change_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn rejecting_an_invalid_update_leaves_old_settings_in_place() {
        let manager = RuntimeConfigManager::new(RuntimeConfig::default());
        let mut bad = manager.get_config().await.sizing;
        bad.size_min_pct = dec!(50);
        bad.size_max_pct = dec!(10);

        let result = manager.update_sizing(bad).await;
        assert!(result.is_err());

        let config = manager.get_config().await;
        assert_eq!(config.sizing.size_min_pct, dec!(2.0));
    }
}
