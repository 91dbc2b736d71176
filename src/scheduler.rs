use crate::prelude::*;

use chrono::{DateTime, Utc};

pub struct Scheduler {
    config: ConfigWrapper,
    channels: Channels,
}

impl Scheduler {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let scheduler = match self.config.scheduler() {
            Some(scheduler) if scheduler.enabled() => scheduler,
            _ => {
                info!("scheduler disabled, skipping");
                return Ok(());
            }
        };

        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(scheduler.scan_interval()));
        // validated at startup, so a parse failure here is unreachable
        let mut next_relogin: Option<DateTime<Utc>> = match scheduler.relogin_cron() {
            Some(cron) => Some(
                cron_parser::parse(cron, &Utc::now())
                    .map_err(|e| anyhow!("invalid relogin_cron: {}", e))?,
            ),
            None => None,
        };

        loop {
            interval.tick().await;

            for account in self.config.enabled_accounts() {
                self.send(Command::ReadSettings(account.clone()))?;
                self.send(Command::ReadPowerData(account))?;
            }

            if let (Some(due), Some(cron)) = (next_relogin, scheduler.relogin_cron().as_ref()) {
                if Utc::now() >= due {
                    info!("relogin cron fired, forcing reconnect for all accounts");
                    for account in self.config.enabled_accounts() {
                        self.send(Command::ForceReconnect(account))?;
                    }
                    next_relogin = Some(
                        cron_parser::parse(cron, &Utc::now())
                            .map_err(|e| anyhow!("invalid relogin_cron: {}", e))?,
                    );
                }
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        if self
            .channels
            .to_coordinator
            .send(coordinator::ChannelData::Command(command))
            .is_err()
        {
            bail!("send(to_coordinator) failed - channel closed?");
        }

        Ok(())
    }
}
