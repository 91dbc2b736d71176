use crate::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub enum ChannelData {
    ReadSettings(
        String,
        Arc<Mutex<Option<oneshot::Sender<Option<BatterySettings>>>>>,
    ),
    SettingsData(String, Box<BatterySettings>),
    Shutdown,
}

/// Holds the last charge configuration successfully fetched from (or
/// written to) the cloud, per account. Used as a fallback when a fetch
/// fails so a partial update still has a full document to merge into.
pub struct SettingsCache {
    channels: Channels,
    settings: Arc<Mutex<HashMap<String, BatterySettings>>>,
}

impl SettingsCache {
    pub fn new(channels: Channels) -> Self {
        Self {
            channels,
            settings: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start(&self) -> Result<()> {
        futures::try_join!(self.cache_getter(), self.cache_setter())?;

        Ok(())
    }

    // external helper method to simplify access to the cache, use like so:
    //
    //   SettingsCache::get(&self.channels, account.name()).await;
    //
    pub async fn get(channels: &Channels, account: &str) -> Option<BatterySettings> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let channel_data = ChannelData::ReadSettings(account.to_string(), tx);
        let _ = channels.read_settings_cache.send(channel_data);
        rx.await.unwrap_or(None)
    }

    pub fn store(channels: &Channels, account: &str, settings: BatterySettings) {
        let channel_data = ChannelData::SettingsData(account.to_string(), Box::new(settings));
        let _ = channels.to_settings_cache.send(channel_data);
    }

    async fn cache_getter(&self) -> Result<()> {
        let mut receiver = self.channels.read_settings_cache.subscribe();

        debug!("settings_cache getter starting");

        while let Ok(data) = receiver.recv().await {
            match data {
                ChannelData::ReadSettings(account, tx) => {
                    let value = self.settings.lock().unwrap().get(&account).cloned();
                    if let Ok(mut tx) = tx.lock() {
                        if let Some(tx) = tx.take() {
                            let _ = tx.send(value);
                        }
                    }
                }
                ChannelData::Shutdown => break,
                _ => (),
            }
        }

        Ok(())
    }

    async fn cache_setter(&self) -> Result<()> {
        let mut receiver = self.channels.to_settings_cache.subscribe();

        debug!("settings_cache setter starting");

        while let Ok(data) = receiver.recv().await {
            match data {
                ChannelData::SettingsData(account, settings) => {
                    self.settings.lock().unwrap().insert(account, *settings);
                }
                ChannelData::Shutdown => break,
                _ => (),
            }
        }

        Ok(())
    }
}
