mod common;
use common::*;

use neovolt_bridge::prelude::*;

use std::io::Write;

fn config_from(yaml: &str) -> Result<Config> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(yaml.as_bytes())?;
    Config::new(file.path().to_string_lossy().to_string())
}

const VALID: &str = r#"
accounts:
  - name: home
    username: user@example.com
    password: hunter2
    station_id: STATION1

mqtt:
  host: localhost

scheduler:
  enabled: true
  scan_interval: 60
  relogin_cron: "0 3 * * *"
"#;

#[test]
fn parses_a_minimal_config() {
    common_setup();

    let config = config_from(VALID).unwrap();

    assert_eq!(config.accounts.len(), 1);
    let account = &config.accounts[0];
    assert!(account.enabled());
    assert_eq!(account.name(), "home");
    assert_eq!(account.base_url(), "https://monitor.byte-watt.com");
    assert_eq!(account.station_id(), "STATION1");
    assert_eq!(account.timeout(), 30);
    assert_eq!(account.max_retries(), 5);

    assert!(config.mqtt.enabled());
    assert_eq!(config.mqtt.port(), 1883);
    assert_eq!(config.mqtt.namespace(), "neovolt");
    assert!(config.mqtt.homeassistant().enabled());
    assert_eq!(config.mqtt.homeassistant().prefix(), "homeassistant");

    let scheduler = config.scheduler.unwrap();
    assert_eq!(scheduler.scan_interval(), 60);
    assert_eq!(scheduler.relogin_cron().as_deref(), Some("0 3 * * *"));

    assert!(!config.read_only);
    assert_eq!(config.loglevel, "info");
}

#[test]
fn rejects_config_with_no_enabled_accounts() {
    common_setup();

    let yaml = VALID.replace("- name: home", "- enabled: false\n    name: home");
    assert!(config_from(&yaml).is_err());
}

#[test]
fn rejects_reserved_account_name() {
    common_setup();

    let yaml = VALID.replace("name: home", "name: all");
    assert!(config_from(&yaml).is_err());
}

#[test]
fn rejects_account_name_with_slash() {
    common_setup();

    let yaml = VALID.replace("name: home", "name: ho/me");
    assert!(config_from(&yaml).is_err());
}

#[test]
fn rejects_invalid_base_url() {
    common_setup();

    let yaml = VALID.replace(
        "station_id: STATION1",
        "station_id: STATION1\n    base_url: \"not a url\"",
    );
    assert!(config_from(&yaml).is_err());
}

#[test]
fn rejects_scan_interval_below_floor() {
    common_setup();

    let yaml = VALID.replace("scan_interval: 60", "scan_interval: 10");
    let err = config_from(&yaml).unwrap_err();
    assert!(err.to_string().contains("scan_interval"));
}

#[test]
fn rejects_invalid_relogin_cron() {
    common_setup();

    let yaml = VALID.replace("\"0 3 * * *\"", "\"not a cron\"");
    assert!(config_from(&yaml).is_err());
}

#[test]
fn disabled_scheduler_skips_validation() {
    common_setup();

    let yaml = VALID
        .replace("enabled: true", "enabled: false")
        .replace("scan_interval: 60", "scan_interval: 10");
    assert!(config_from(&yaml).is_ok());
}

#[test]
fn wrapper_finds_accounts_by_name() {
    common_setup();

    let config = Factory::config_wrapper();

    assert!(config.account_with_name("home").is_some());
    assert!(config.account_with_name("nope").is_none());
    assert_eq!(config.enabled_accounts().len(), 1);
}

#[test]
fn homeassistant_needs_mqtt_enabled() {
    common_setup();

    let mut config = Factory::config();
    config.mqtt.homeassistant.enabled = true;
    config.mqtt.enabled = false;
    assert!(!ConfigWrapper::from_config(config).homeassistant_enabled());

    let mut config = Factory::config();
    config.mqtt.homeassistant.enabled = true;
    assert!(ConfigWrapper::from_config(config).homeassistant_enabled());
}
