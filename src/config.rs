use crate::prelude::*;

use serde::Deserialize;
use serde_with::serde_as;
use std::sync::{Arc, Mutex};

/// Floor for the poll interval; the cloud API rate-limits aggressively.
pub const MIN_SCAN_INTERVAL: u64 = 30;

const DEFAULT_BASE_URL: &str = "https://monitor.byte-watt.com";

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub accounts: Vec<Account>,
    pub mqtt: Mqtt,

    pub scheduler: Option<Scheduler>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde(default = "Config::default_read_only")]
    pub read_only: bool,
}

// Account {{{
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    /// Name used in MQTT topics for this account
    pub name: String,

    pub username: String,
    pub password: String,

    #[serde(default = "Config::default_base_url")]
    pub base_url: String,

    /// Station id passed to the cloud API; empty selects all systems
    pub station_id: Option<String>,

    pub timeout: Option<u64>,
    pub max_retries: Option<u64>,
    pub retry_delay: Option<u64>,
}
impl Account {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn station_id(&self) -> &str {
        self.station_id.as_deref().unwrap_or("")
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(30) // seconds
    }

    pub fn max_retries(&self) -> u64 {
        self.max_retries.unwrap_or(5)
    }

    pub fn retry_delay(&self) -> u64 {
        self.retry_delay.unwrap_or(1) // seconds
    }
} // }}}

// HomeAssistant {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct HomeAssistant {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_homeassistant_prefix")]
    pub prefix: String,
}

impl HomeAssistant {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_mqtt_homeassistant")]
    pub homeassistant: HomeAssistant,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn homeassistant(&self) -> &HomeAssistant {
        &self.homeassistant
    }
} // }}}

// Scheduler {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Scheduler {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    /// Seconds between settings/power polls
    #[serde(default = "Config::default_scan_interval")]
    pub scan_interval: u64,

    /// Optional cron expression for a forced re-login
    pub relogin_cron: Option<String>,
}
impl Scheduler {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn scan_interval(&self) -> u64 {
        self.scan_interval
    }

    pub fn relogin_cron(&self) -> &Option<String> {
        &self.relogin_cron
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.config.lock().unwrap().accounts.clone()
    }

    pub fn enabled_accounts(&self) -> Vec<Account> {
        self.accounts().into_iter().filter(|a| a.enabled()).collect()
    }

    pub fn account_with_name(&self, name: &str) -> Option<Account> {
        self.enabled_accounts().into_iter().find(|a| a.name() == name)
    }

    pub fn accounts_for_message(&self, message: &mqtt::Message) -> Result<Vec<Account>> {
        let (target_account, _) = message.split_cmd_topic()?;
        let accounts = self.enabled_accounts();

        match target_account {
            mqtt::TargetAccount::All => Ok(accounts),
            mqtt::TargetAccount::Name(name) => Ok(accounts
                .into_iter()
                .filter(|a| a.name() == name)
                .collect()),
        }
    }

    pub fn mqtt(&self) -> Mqtt {
        self.config.lock().unwrap().mqtt.clone()
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.config.lock().unwrap().scheduler.clone()
    }

    pub fn loglevel(&self) -> String {
        self.config.lock().unwrap().loglevel.clone()
    }

    pub fn read_only(&self) -> bool {
        self.config.lock().unwrap().read_only
    }

    pub fn homeassistant_enabled(&self) -> bool {
        let config = self.config.lock().unwrap();
        config.mqtt.enabled && config.mqtt.homeassistant.enabled
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| file_error_with_source!(err, "error reading {}", file))?;

        let config: Self = serde_yaml::from_str(&content)?;

        info!("Configuration loaded successfully:");
        info!(
            "  Accounts: {} configured, {} enabled",
            config.accounts.len(),
            config.accounts.iter().filter(|a| a.enabled).count()
        );
        for (i, account) in config.accounts.iter().enumerate() {
            info!("    Account[{}]:", i);
            info!("      Enabled: {}", account.enabled);
            info!("      Name: {}", account.name);
            info!("      Username: {}", account.username);
            info!("      Base URL: {}", account.base_url);
            info!("      Station ID: {}", account.station_id());
            info!("      Timeout: {}s", account.timeout());
            info!("      Max Retries: {}", account.max_retries());
        }

        info!("  MQTT: {}", if config.mqtt.enabled { "enabled" } else { "disabled" });
        if config.mqtt.enabled {
            info!("    Host: {}", config.mqtt.host);
            info!("    Port: {}", config.mqtt.port);
            info!("    Namespace: {}", config.mqtt.namespace);
            info!(
                "    Home Assistant discovery: {}",
                if config.mqtt.homeassistant.enabled { "enabled" } else { "disabled" }
            );
        }

        info!("  Scheduler: {}", if config.scheduler.is_some() { "enabled" } else { "disabled" });
        if let Some(scheduler) = &config.scheduler {
            info!("    Enabled: {}", scheduler.enabled);
            info!("    Scan Interval: {}s", scheduler.scan_interval);
            if let Some(cron) = &scheduler.relogin_cron {
                info!("    Relogin Cron: {}", cron);
            }
        }

        info!("  Read Only: {}", config.read_only);
        info!("  Log Level: {}", config.loglevel);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                return Err(file_error!("MQTT host cannot be empty"));
            }
        }

        if !self.accounts.iter().any(|a| a.enabled) {
            return Err(file_error!("at least one account must be enabled"));
        }

        for (i, account) in self.accounts.iter().enumerate() {
            if !account.enabled {
                continue;
            }
            if account.name.is_empty() {
                bail!("accounts[{}].name cannot be empty", i);
            }
            if account.name == "all" {
                bail!("accounts[{}].name 'all' is reserved for broadcast topics", i);
            }
            if account.name.contains('/') {
                bail!("accounts[{}].name cannot contain '/': it is used in MQTT topics", i);
            }
            if account.username.is_empty() || account.password.is_empty() {
                bail!("accounts[{}] must set username and password", i);
            }
            if let Err(e) = url::Url::parse(&account.base_url) {
                return Err(file_error!("invalid base_url for account {}: {}", account.name, e));
            }
            if account.timeout() == 0 {
                return Err(file_error!("invalid timeout for account {}: 0", account.name));
            }
        }

        if let Some(scheduler) = &self.scheduler {
            if scheduler.enabled {
                if scheduler.scan_interval < MIN_SCAN_INTERVAL {
                    bail!(
                        "scheduler.scan_interval must be at least {}s, got {}s",
                        MIN_SCAN_INTERVAL,
                        scheduler.scan_interval
                    );
                }
                if let Some(cron) = &scheduler.relogin_cron {
                    if let Err(e) = cron_parser::parse(cron, &chrono::Utc::now()) {
                        return Err(file_error!("invalid scheduler.relogin_cron: {}", e));
                    }
                }
            }
        }

        Ok(())
    }

    fn default_mqtt_port() -> u16 {
        1883
    }
    fn default_mqtt_namespace() -> String {
        "neovolt".to_string()
    }

    fn default_mqtt_homeassistant() -> HomeAssistant {
        HomeAssistant {
            enabled: Self::default_enabled(),
            prefix: Self::default_mqtt_homeassistant_prefix(),
        }
    }

    fn default_mqtt_homeassistant_prefix() -> String {
        "homeassistant".to_string()
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_read_only() -> bool {
        false
    }

    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }

    fn default_scan_interval() -> u64 {
        60
    }
}
