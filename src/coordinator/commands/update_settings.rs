use crate::prelude::*;

use crate::cloud;
use crate::monitor::CircuitBreaker;

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Apply a partial settings update to one account.
///
/// The cloud's update endpoint replaces the whole charge configuration,
/// so this is read-modify-write: fetch the current document, overlay the
/// provided fields, send the merged result back.
pub struct UpdateSettings {
    channels: Channels,
    api: Arc<cloud::Api>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    update: SettingsUpdate,
}

impl UpdateSettings {
    pub fn new(
        channels: Channels,
        api: Arc<cloud::Api>,
        breaker: Arc<Mutex<CircuitBreaker>>,
        update: SettingsUpdate,
    ) -> Self {
        Self {
            channels,
            api,
            breaker,
            update,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let account = self.api.account().name().to_string();

        if !self.breaker.lock().unwrap().can_execute() {
            bail!("circuit breaker open for {}, refusing to call cloud", account);
        }

        let mut settings = self.current_settings(&account).await?;
        self.update.apply(&mut settings);

        let started = Instant::now();
        match self.api.update_charge_config(&settings).await {
            Ok(()) => {
                self.breaker.lock().unwrap().record_success(started.elapsed());
            }
            Err(err) => {
                self.breaker.lock().unwrap().record_failure(err.to_string());
                return Err(err);
            }
        }

        info!("settings updated for {}", account);

        // the merged document is now the cloud's truth; cache it and
        // publish it so retained state tracks what we wrote
        SettingsCache::store(&self.channels, &account, settings.clone());

        let message = mqtt::Message::for_settings(&account, &settings)?;
        if self
            .channels
            .to_mqtt
            .send(mqtt::ChannelData::Message(message))
            .is_err()
        {
            bail!("send(to_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    /// Fetch the current document, falling back to the last cached copy
    /// when the fetch fails. Updating from a stale cache beats refusing
    /// the command outright.
    async fn current_settings(&self, account: &str) -> Result<BatterySettings> {
        let started = Instant::now();
        match self.api.charge_config().await {
            Ok(settings) => {
                self.breaker.lock().unwrap().record_success(started.elapsed());
                Ok(settings)
            }
            Err(err) => {
                self.breaker.lock().unwrap().record_failure(err.to_string());
                warn!(
                    "settings fetch failed for {}, trying cache: {}",
                    account, err
                );

                match SettingsCache::get(&self.channels, account).await {
                    Some(settings) => Ok(settings),
                    None => bail!(
                        "no settings available for {}: fetch failed and cache is empty",
                        account
                    ),
                }
            }
        }
    }
}
