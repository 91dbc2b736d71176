use crate::prelude::*;

pub mod commands;

use crate::cloud;
use crate::monitor::CircuitBreaker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum ChannelData {
    Shutdown,
    Command(Command),
}

#[derive(Default)]
pub struct CallStats {
    pub commands_received: u64,
    pub commands_ok: u64,
    pub commands_failed: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
    pub cloud_calls: u64,
    pub cloud_errors: u64,
    // failures and last command per account
    pub account_failures: HashMap<String, u64>,
    pub last_commands: HashMap<String, String>,
}

impl CallStats {
    pub fn print_summary(&self) {
        info!("Call Statistics:");
        info!("  Commands received: {}", self.commands_received);
        info!("    Succeeded: {}", self.commands_ok);
        info!("    Failed: {}", self.commands_failed);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
        info!("  Cloud API:");
        info!("    Calls: {}", self.cloud_calls);
        info!("    Errors: {}", self.cloud_errors);
        info!("  Failures by account:");
        for (account, count) in &self.account_failures {
            info!("    {}: {}", account, count);
            if let Some(last) = self.last_commands.get(account) {
                info!("    Last command: {}", last);
            }
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    registry: service::Registry,
    apis: HashMap<String, Arc<cloud::Api>>,
    breakers: HashMap<String, Arc<Mutex<CircuitBreaker>>>,
    pub stats: Arc<Mutex<CallStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Result<Self> {
        let mut apis = HashMap::new();
        let mut breakers = HashMap::new();

        for account in config.enabled_accounts() {
            apis.insert(
                account.name().to_string(),
                Arc::new(cloud::Api::new(account.clone())?),
            );
            breakers.insert(
                account.name().to_string(),
                Arc::new(Mutex::new(CircuitBreaker::default())),
            );
        }

        Ok(Self {
            config,
            channels,
            registry: service::Registry::new(),
            apis,
            breakers,
            stats: Arc::new(Mutex::new(CallStats::default())),
        })
    }

    pub fn registry(&self) -> &service::Registry {
        &self.registry
    }

    pub async fn start(&self) -> Result<()> {
        if self.config.mqtt().enabled() {
            futures::try_join!(self.command_receiver(), self.mqtt_receiver())?;
        } else {
            self.command_receiver().await?;
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_coordinator.send(ChannelData::Shutdown);

        if self.config.mqtt().enabled() {
            let _ = self.channels.from_mqtt.send(mqtt::ChannelData::Shutdown);
        }
    }

    // commands from the scheduler (and anything else internal)
    async fn command_receiver(&self) -> Result<()> {
        let mut receiver = self.channels.to_coordinator.subscribe();

        loop {
            match receiver.recv().await? {
                ChannelData::Command(command) => {
                    let _ = self.run_command(command).await;
                }
                ChannelData::Shutdown => {
                    info!("Received shutdown signal, printing final statistics:");
                    if let Ok(stats) = self.stats.lock() {
                        stats.print_summary();
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    async fn mqtt_receiver(&self) -> Result<()> {
        let mut receiver = self.channels.from_mqtt.subscribe();

        while let mqtt::ChannelData::Message(message) = receiver.recv().await? {
            let _ = self.process_message(message).await;
        }

        Ok(())
    }

    async fn process_message(&self, message: mqtt::Message) -> Result<()> {
        for account in self.config.accounts_for_message(&message)? {
            match message.to_command(account, &self.registry) {
                Ok(command) => {
                    info!("parsed command {:?}", command);
                    let _ = self.run_command(command).await;
                }
                Err(err) => {
                    error!("{:?}", err);
                    if let Ok(mut stats) = self.stats.lock() {
                        stats.commands_failed += 1;
                    }
                }
            }
        }

        Ok(())
    }

    /// Run one command and publish OK/FAIL to its result topic.
    async fn run_command(&self, command: Command) -> Result<()> {
        let account_name = command.account().name().to_string();

        if let Ok(mut stats) = self.stats.lock() {
            stats.commands_received += 1;
            stats
                .last_commands
                .insert(account_name.clone(), format!("{:?}", command));
        }

        let topic_reply = command.to_result_topic();
        let result = self.process_command(command).await;

        if let Ok(mut stats) = self.stats.lock() {
            match &result {
                Ok(()) => stats.commands_ok += 1,
                Err(_) => {
                    stats.commands_failed += 1;
                    *stats.account_failures.entry(account_name).or_insert(0) += 1;
                }
            }
        }

        if let Err(err) = &result {
            error!("command failed: {:?}", err);
        }

        let reply = mqtt::ChannelData::Message(mqtt::Message {
            topic: topic_reply,
            retain: false,
            payload: if result.is_ok() { "OK" } else { "FAIL" }.to_string(),
        });
        if self.channels.to_mqtt.send(reply).is_err() {
            bail!("send(to_mqtt) failed - channel closed?");
        }

        result
    }

    async fn process_command(&self, command: Command) -> Result<()> {
        use Command::*;

        // stats reads are answered locally, no cloud call involved
        if let ReadStats(account) = &command {
            return self.read_stats(account);
        }

        if let Ok(mut stats) = self.stats.lock() {
            stats.cloud_calls += 1;
        }

        // every write command boils down to a partial settings update
        let result = if let Some(update) = command.to_settings_update() {
            if self.config.read_only() {
                bail!("read_only mode, refusing to write settings");
            }
            if update.is_empty() {
                bail!("refusing to send an empty settings update");
            }
            self.update_settings(command.account().clone(), update).await
        } else {
            match command {
                ReadSettings(account) => self.read_settings(account).await,
                ReadPowerData(account) => self.read_power(account).await,
                ForceReconnect(account) => self.force_reconnect(account).await,
                _ => unreachable!(),
            }
        };

        if result.is_err() {
            if let Ok(mut stats) = self.stats.lock() {
                stats.cloud_errors += 1;
            }
        }

        result
    }

    async fn update_settings(
        &self,
        account: config::Account,
        update: SettingsUpdate,
    ) -> Result<()> {
        commands::update_settings::UpdateSettings::new(
            self.channels.clone(),
            self.api_for(&account)?,
            self.breaker_for(&account)?,
            update,
        )
        .run()
        .await
    }

    async fn read_settings(&self, account: config::Account) -> Result<()> {
        commands::read_settings::ReadSettings::new(
            self.channels.clone(),
            self.api_for(&account)?,
            self.breaker_for(&account)?,
        )
        .run()
        .await
    }

    async fn read_power(&self, account: config::Account) -> Result<()> {
        commands::read_power::ReadPower::new(
            self.channels.clone(),
            self.api_for(&account)?,
            self.breaker_for(&account)?,
        )
        .run()
        .await
    }

    /// Publish breaker state and call counters for one account, so health
    /// checks don't have to wait for the shutdown summary.
    fn read_stats(&self, account: &config::Account) -> Result<()> {
        let breaker = self.breaker_for(account)?;
        let breaker = breaker
            .lock()
            .map_err(|_| anyhow!("breaker lock poisoned for {}", account.name()))?;
        let stats = self
            .stats
            .lock()
            .map_err(|_| anyhow!("stats lock poisoned"))?;

        let report = serde_json::json!({
            "circuit_breaker": breaker.state().to_string(),
            "success_rate": breaker.stats.success_rate(),
            "total_successes": breaker.stats.total_successes,
            "total_failures": breaker.stats.total_failures,
            "consecutive_failures": breaker.stats.consecutive_failures,
            "last_error": breaker.stats.last_error.clone(),
            "average_response_time_ms": breaker
                .stats
                .average_response_time()
                .map(|d| d.as_millis() as u64),
            "commands_received": stats.commands_received,
            "commands_ok": stats.commands_ok,
            "commands_failed": stats.commands_failed,
            "cloud_calls": stats.cloud_calls,
            "cloud_errors": stats.cloud_errors,
        });

        let message = mqtt::ChannelData::Message(mqtt::Message {
            topic: format!("{}/stats", account.name()),
            retain: false,
            payload: serde_json::to_string(&report)?,
        });
        if self.channels.to_mqtt.send(message).is_err() {
            bail!("send(to_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    /// Drop the cached session and log in again. Also forgets breaker
    /// history; a manual reconnect is a statement that the cloud is back.
    async fn force_reconnect(&self, account: config::Account) -> Result<()> {
        info!("forcing reconnect for {}", account.name());

        let api = self.api_for(&account)?;
        api.clear_token();
        api.login().await?;

        if let Ok(mut breaker) = self.breaker_for(&account)?.lock() {
            breaker.reset();
        }

        Ok(())
    }

    fn api_for(&self, account: &config::Account) -> Result<Arc<cloud::Api>> {
        self.apis
            .get(account.name())
            .cloned()
            .ok_or_else(|| anyhow!("no API client for account {}", account.name()))
    }

    fn breaker_for(&self, account: &config::Account) -> Result<Arc<Mutex<CircuitBreaker>>> {
        self.breakers
            .get(account.name())
            .cloned()
            .ok_or_else(|| anyhow!("no circuit breaker for account {}", account.name()))
    }
}
