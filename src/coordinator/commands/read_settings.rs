use crate::prelude::*;

use crate::cloud;
use crate::monitor::CircuitBreaker;

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Fetch the charge configuration and publish it as retained state.
pub struct ReadSettings {
    channels: Channels,
    api: Arc<cloud::Api>,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl ReadSettings {
    pub fn new(
        channels: Channels,
        api: Arc<cloud::Api>,
        breaker: Arc<Mutex<CircuitBreaker>>,
    ) -> Self {
        Self {
            channels,
            api,
            breaker,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let account = self.api.account().name().to_string();

        if !self.breaker.lock().unwrap().can_execute() {
            bail!("circuit breaker open for {}, refusing to call cloud", account);
        }

        let started = Instant::now();
        let settings = match self.api.charge_config().await {
            Ok(settings) => {
                self.breaker.lock().unwrap().record_success(started.elapsed());
                settings
            }
            Err(err) => {
                self.breaker.lock().unwrap().record_failure(err.to_string());
                return Err(err);
            }
        };

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
}
