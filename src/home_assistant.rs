use crate::prelude::*;

use serde::Serialize;

/// Home Assistant MQTT discovery payloads.
///
/// One `number` entity for the minimum SOC, four `text` entities for the
/// charge/discharge window times and two `switch` entities for the
/// discharge-control and grid-charging toggles. All of them publish their
/// commands to the same cmd topics that scripted callers use, and read
/// their state from the retained settings document.
pub struct Config {
    account: config::Account,
    mqtt_config: config::Mqtt,
}

#[derive(Debug, Serialize)]
pub struct Availability {
    topic: String,
}

#[derive(Debug, Serialize)]
pub struct Device {
    identifiers: [String; 1],
    manufacturer: String,
    model: String,
    name: String,
}

#[derive(Debug, Serialize)]
pub struct Number {
    availability: Availability,
    device: Device,
    name: String,
    state_topic: String,
    command_topic: String,
    value_template: String,
    unique_id: String,
    min: i64,
    max: i64,
    step: i64,
    unit_of_measurement: String,
}

#[derive(Debug, Serialize)]
pub struct Switch {
    availability: Availability,
    device: Device,
    name: String,
    state_topic: String,
    command_topic: String,
    value_template: String,
    unique_id: String,
    state_on: String,
    state_off: String,
    payload_on: String,
    payload_off: String,
}

#[derive(Debug, Serialize)]
pub struct Text {
    availability: Availability,
    device: Device,
    name: String,
    state_topic: String,
    command_topic: String,
    value_template: String,
    unique_id: String,
    pattern: String,
}

impl Config {
    pub fn new(account: &config::Account, mqtt_config: &config::Mqtt) -> Self {
        Self {
            account: account.clone(),
            mqtt_config: mqtt_config.clone(),
        }
    }

    pub fn all(&self) -> Result<Vec<mqtt::Message>> {
        let r = vec![
            self.soc_number(
                service::SET_MINIMUM_SOC,
                "bat_use_cap",
                "Minimum State of Charge",
            )?,
            self.time_text(
                service::SET_CHARGE_START_TIME,
                "time_chaf1a",
                "Charge Start Time",
            )?,
            self.time_text(
                service::SET_CHARGE_END_TIME,
                "time_chae1a",
                "Charge End Time",
            )?,
            self.time_text(
                service::SET_DISCHARGE_START_TIME,
                "time_disf1a",
                "Discharge Start Time",
            )?,
            // discharge end only has the legacy service name
            self.time_text(
                service::SET_DISCHARGE_TIME,
                "time_dise1a",
                "Discharge End Time",
            )?,
            self.setting_switch("set_discharge_control", "ctr_dis", "Discharge Time Control")?,
            self.setting_switch("set_grid_charge", "grid_charge", "Grid Charging")?,
        ];

        Ok(r)
    }

    fn soc_number(&self, service_name: &str, wire_field: &str, label: &str) -> Result<mqtt::Message> {
        let config = Number {
            value_template: format!("{{{{ value_json.{} }}}}", wire_field),
            state_topic: format!(
                "{}/{}/settings",
                self.mqtt_config.namespace(),
                self.account.name()
            ),
            command_topic: format!(
                "{}/cmd/{}/{}",
                self.mqtt_config.namespace(),
                self.account.name(),
                service_name
            ),
            unique_id: format!("neovolt_{}_{}", self.account.name(), wire_field),
            name: format!("{} {}", self.account.name(), label),
            availability: self.availability(),
            device: self.device(),
            min: service::SOC_MIN,
            max: service::SOC_MAX,
            step: 1,
            unit_of_measurement: "%".to_string(),
        };

        Ok(mqtt::Message {
            topic: format!(
                "{}/number/{}/{}/config",
                self.mqtt_config.homeassistant().prefix(),
                self.account.name(),
                wire_field
            ),
            retain: true,
            payload: serde_json::to_string(&config)?,
        })
    }

    fn time_text(&self, service_name: &str, wire_field: &str, label: &str) -> Result<mqtt::Message> {
        let config = Text {
            value_template: format!("{{{{ value_json.{} }}}}", wire_field),
            state_topic: format!(
                "{}/{}/settings",
                self.mqtt_config.namespace(),
                self.account.name()
            ),
            command_topic: format!(
                "{}/cmd/{}/{}",
                self.mqtt_config.namespace(),
                self.account.name(),
                service_name
            ),
            unique_id: format!("neovolt_{}_{}", self.account.name(), wire_field),
            name: format!("{} {}", self.account.name(), label),
            availability: self.availability(),
            device: self.device(),
            pattern: "^([01][0-9]|2[0-3]):[0-5][0-9]$".to_string(),
        };

        Ok(mqtt::Message {
            topic: format!(
                "{}/text/{}/{}/config",
                self.mqtt_config.homeassistant().prefix(),
                self.account.name(),
                wire_field
            ),
            retain: true,
            payload: serde_json::to_string(&config)?,
        })
    }

    // the API stores these toggles as 0/1 ints, so both sides of the
    // conversation speak "0"/"1"
    fn setting_switch(
        &self,
        command_name: &str,
        wire_field: &str,
        label: &str,
    ) -> Result<mqtt::Message> {
        let config = Switch {
            value_template: format!("{{{{ value_json.{} }}}}", wire_field),
            state_topic: format!(
                "{}/{}/settings",
                self.mqtt_config.namespace(),
                self.account.name()
            ),
            command_topic: format!(
                "{}/cmd/{}/{}",
                self.mqtt_config.namespace(),
                self.account.name(),
                command_name
            ),
            unique_id: format!("neovolt_{}_{}", self.account.name(), wire_field),
            name: format!("{} {}", self.account.name(), label),
            availability: self.availability(),
            device: self.device(),
            state_on: "1".to_string(),
            state_off: "0".to_string(),
            payload_on: "1".to_string(),
            payload_off: "0".to_string(),
        };

        Ok(mqtt::Message {
            topic: format!(
                "{}/switch/{}/{}/config",
                self.mqtt_config.homeassistant().prefix(),
                self.account.name(),
                wire_field
            ),
            retain: true,
            payload: serde_json::to_string(&config)?,
        })
    }

    fn availability(&self) -> Availability {
        Availability {
            topic: format!("{}/LWT", self.mqtt_config.namespace()),
        }
    }

    fn device(&self) -> Device {
        Device {
            identifiers: [format!("neovolt_{}", self.account.name())],
            manufacturer: "Neovolt".to_string(),
            model: "Battery Storage".to_string(),
            name: format!("neovolt_{}", self.account.name()),
        }
    }
}
