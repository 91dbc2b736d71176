use neovolt_bridge::prelude::*;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory();

impl Factory {
    pub fn account() -> config::Account {
        Self::account_with_base_url("https://monitor.example.com".to_string())
    }

    // mockito-friendly: single attempt, no retry sleeps
    pub fn account_with_base_url(base_url: String) -> config::Account {
        config::Account {
            enabled: true,
            name: "home".to_string(),
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
            base_url,
            station_id: Some("STATION1".to_string()),
            timeout: Some(5),
            max_retries: Some(1),
            retry_delay: Some(0),
        }
    }

    pub fn config() -> Config {
        Config {
            accounts: vec![Self::account()],
            mqtt: config::Mqtt {
                enabled: true,
                host: "localhost".to_string(),
                port: 1883,
                username: None,
                password: None,
                namespace: "neovolt".to_string(),
                homeassistant: config::HomeAssistant {
                    enabled: false,
                    prefix: "homeassistant".to_string(),
                },
            },
            scheduler: None,
            loglevel: "info".to_string(),
            read_only: false,
        }
    }

    pub fn config_wrapper() -> ConfigWrapper {
        ConfigWrapper::from_config(Self::config())
    }

    pub fn settings() -> BatterySettings {
        BatterySettings::default()
    }

    pub fn message(topic: &str, payload: &str) -> mqtt::Message {
        mqtt::Message {
            topic: topic.to_string(),
            retain: false,
            payload: payload.to_string(),
        }
    }

    /// A response body in the cloud's envelope format.
    pub fn envelope(code: i64, data: serde_json::Value) -> String {
        serde_json::json!({
            "code": code,
            "msg": "Success",
            "data": data,
        })
        .to_string()
    }
}
