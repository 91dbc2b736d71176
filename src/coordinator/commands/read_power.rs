use crate::prelude::*;

use crate::cloud;
use crate::monitor::CircuitBreaker;

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Fetch the latest live power readings and publish them.
pub struct ReadPower {
    channels: Channels,
    api: Arc<cloud::Api>,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl ReadPower {
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
        let power = match self.api.last_power_data().await {
            Ok(power) => {
                self.breaker.lock().unwrap().record_success(started.elapsed());
                power
            }
            Err(err) => {
                self.breaker.lock().unwrap().record_failure(err.to_string());
                return Err(err);
            }
        };

        debug!(
            "power data for {}: soc={}% battery={}W",
            account, power.soc, power.battery
        );

        let message = mqtt::Message::for_power_data(&account, &power)?;
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
