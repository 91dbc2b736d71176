use crate::prelude::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The charge configuration document as the cloud API stores it.
///
/// Field names follow the wire format (`time_chaf1a` = weekday charge
/// period 1 start, etc). The update endpoint replaces the whole document,
/// so everything we fetched has to be echoed back; fields we don't model
/// are kept in `additional_fields` untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatterySettings {
    #[serde(default = "BatterySettings::default_grid_charge")]
    pub grid_charge: i64,
    #[serde(default = "BatterySettings::default_ctr_dis")]
    pub ctr_dis: i64,

    /// Minimum remaining SOC, percent
    #[serde(default = "BatterySettings::default_bat_use_cap")]
    pub bat_use_cap: i64,
    /// Charge cap, percent. The API serves this one as a string.
    #[serde(default = "BatterySettings::default_bat_high_cap")]
    pub bat_high_cap: String,

    // weekday period 1 - the slots the services actually control
    #[serde(default = "BatterySettings::default_charge_start")]
    pub time_chaf1a: String,
    #[serde(default = "BatterySettings::default_charge_end")]
    pub time_chae1a: String,
    #[serde(default = "BatterySettings::default_discharge_start")]
    pub time_disf1a: String,
    #[serde(default = "BatterySettings::default_discharge_end")]
    pub time_dise1a: String,

    // weekday period 2
    #[serde(default = "BatterySettings::default_midnight")]
    pub time_chaf2a: String,
    #[serde(default = "BatterySettings::default_midnight")]
    pub time_chae2a: String,
    #[serde(default = "BatterySettings::default_disf2a")]
    pub time_disf2a: String,
    #[serde(default = "BatterySettings::default_dise2a")]
    pub time_dise2a: String,

    /// Everything else the API returned: weekend/peak/fill/offset slots,
    /// serial numbers, firmware versions. Sent back verbatim on update.
    #[serde(flatten)]
    pub additional_fields: BTreeMap<String, serde_json::Value>,
}

impl Default for BatterySettings {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({}))
            .expect("default settings document must deserialize")
    }
}

impl BatterySettings {
    fn default_grid_charge() -> i64 {
        1
    }
    fn default_ctr_dis() -> i64 {
        1
    }
    fn default_bat_use_cap() -> i64 {
        6
    }
    fn default_bat_high_cap() -> String {
        "100".to_string()
    }
    fn default_charge_start() -> String {
        "14:30".to_string()
    }
    fn default_charge_end() -> String {
        "16:00".to_string()
    }
    fn default_discharge_start() -> String {
        "16:00".to_string()
    }
    fn default_discharge_end() -> String {
        "23:00".to_string()
    }
    fn default_midnight() -> String {
        "00:00".to_string()
    }
    fn default_disf2a() -> String {
        "06:00".to_string()
    }
    fn default_dise2a() -> String {
        "10:00".to_string()
    }
}

/// Live power readings from the energy storage endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerData {
    #[serde(default)]
    pub soc: f64,
    #[serde(default, rename = "gridConsumption")]
    pub grid_consumption: f64,
    #[serde(default)]
    pub battery: f64,
    #[serde(default, rename = "houseConsumption")]
    pub house_consumption: f64,
    #[serde(default, rename = "createTime")]
    pub create_time: String,
    #[serde(default)]
    pub pv: f64,

    #[serde(flatten)]
    pub additional_fields: BTreeMap<String, serde_json::Value>,
}

/// A partial settings change: only the fields that were provided get
/// written, everything else keeps its current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsUpdate {
    pub discharge_start_time: Option<String>,
    pub discharge_end_time: Option<String>,
    pub charge_start_time: Option<String>,
    pub charge_end_time: Option<String>,
    pub minimum_soc: Option<i64>,
    pub charge_cap: Option<i64>,
    pub discharge_time_control: Option<bool>,
    pub grid_charging: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Route a validated service field value into the right slot.
    pub fn set_time_field(&mut self, field_key: &str, time: String) -> Result<()> {
        match field_key {
            service::FIELD_START_DISCHARGE => self.discharge_start_time = Some(time),
            service::FIELD_END_DISCHARGE => self.discharge_end_time = Some(time),
            service::FIELD_START_CHARGE => self.charge_start_time = Some(time),
            service::FIELD_END_CHARGE => self.charge_end_time = Some(time),
            _ => bail!("field {} is not a time field", field_key),
        }
        Ok(())
    }

    pub fn set_number_field(&mut self, field_key: &str, value: i64) -> Result<()> {
        match field_key {
            service::FIELD_MINIMUM_SOC => self.minimum_soc = Some(value),
            _ => bail!("field {} is not a number field", field_key),
        }
        Ok(())
    }

    /// Merge into a fetched settings document. Set only provided fields,
    /// leave others untouched.
    pub fn apply(&self, settings: &mut BatterySettings) {
        if let Some(t) = &self.discharge_start_time {
            debug!("updating discharge start time to {}", t);
            settings.time_disf1a = t.clone();
        }
        if let Some(t) = &self.discharge_end_time {
            debug!("updating discharge end time to {}", t);
            settings.time_dise1a = t.clone();
        }
        if let Some(t) = &self.charge_start_time {
            debug!("updating charge start time to {}", t);
            settings.time_chaf1a = t.clone();
        }
        if let Some(t) = &self.charge_end_time {
            debug!("updating charge end time to {}", t);
            settings.time_chae1a = t.clone();
        }
        if let Some(soc) = self.minimum_soc {
            debug!("updating minimum SOC to {}%", soc);
            settings.bat_use_cap = soc;
        }
        if let Some(cap) = self.charge_cap {
            debug!("updating charge cap to {}%", cap);
            settings.bat_high_cap = cap.to_string();
        }
        if let Some(enabled) = self.discharge_time_control {
            debug!("updating discharge time control to {}", enabled);
            settings.ctr_dis = i64::from(enabled);
        }
        if let Some(enabled) = self.grid_charging {
            debug!("updating grid charging to {}", enabled);
            settings.grid_charge = i64::from(enabled);
        }
    }

    /// Shorthand constructors for the single-purpose services.
    pub fn discharge_end(time: String) -> Self {
        Self {
            discharge_end_time: Some(time),
            ..Default::default()
        }
    }

    pub fn discharge_start(time: String) -> Self {
        Self {
            discharge_start_time: Some(time),
            ..Default::default()
        }
    }

    pub fn charge_start(time: String) -> Self {
        Self {
            charge_start_time: Some(time),
            ..Default::default()
        }
    }

    pub fn charge_end(time: String) -> Self {
        Self {
            charge_end_time: Some(time),
            ..Default::default()
        }
    }

    pub fn minimum_soc(soc: i64) -> Self {
        Self {
            minimum_soc: Some(soc),
            ..Default::default()
        }
    }

    pub fn charge_cap(cap: i64) -> Self {
        Self {
            charge_cap: Some(cap),
            ..Default::default()
        }
    }

    pub fn discharge_control(enabled: bool) -> Self {
        Self {
            discharge_time_control: Some(enabled),
            ..Default::default()
        }
    }

    pub fn grid_charge(enabled: bool) -> Self {
        Self {
            grid_charging: Some(enabled),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_matches_api_defaults() {
        let settings = BatterySettings::default();
        assert_eq!(settings.bat_use_cap, 6);
        assert_eq!(settings.time_chaf1a, "14:30");
        assert_eq!(settings.time_dise1a, "23:00");
        assert!(settings.additional_fields.is_empty());
    }

    #[test]
    fn apply_only_touches_provided_fields() {
        let mut settings = BatterySettings::default();
        let before = settings.clone();

        SettingsUpdate {
            minimum_soc: Some(25),
            charge_end_time: Some("17:30".to_string()),
            ..Default::default()
        }
        .apply(&mut settings);

        assert_eq!(settings.bat_use_cap, 25);
        assert_eq!(settings.time_chae1a, "17:30");
        assert_eq!(settings.time_chaf1a, before.time_chaf1a);
        assert_eq!(settings.time_disf1a, before.time_disf1a);
        assert_eq!(settings.time_dise1a, before.time_dise1a);
        assert_eq!(settings.grid_charge, before.grid_charge);
    }

    #[test]
    fn toggles_and_charge_cap_write_api_formats() {
        let mut settings = BatterySettings::default();

        SettingsUpdate {
            charge_cap: Some(80),
            discharge_time_control: Some(true),
            grid_charging: Some(false),
            ..Default::default()
        }
        .apply(&mut settings);

        // bools become the API's 0/1 ints, the cap becomes its string form
        assert_eq!(settings.ctr_dis, 1);
        assert_eq!(settings.grid_charge, 0);
        assert_eq!(settings.bat_high_cap, "80");
    }

    #[test]
    fn unknown_api_fields_round_trip() {
        let doc = serde_json::json!({
            "grid_charge": 0,
            "bat_use_cap": 10,
            "time_chaf1a": "01:00",
            "sys_sn": "AL1234567890",
            "ems_version": "v1.2.3",
            "upsReserve": 1,
        });

        let mut settings: BatterySettings = serde_json::from_value(doc).unwrap();
        SettingsUpdate::minimum_soc(50).apply(&mut settings);

        let out = serde_json::to_value(&settings).unwrap();
        assert_eq!(out["bat_use_cap"], 50);
        assert_eq!(out["sys_sn"], "AL1234567890");
        assert_eq!(out["ems_version"], "v1.2.3");
        assert_eq!(out["upsReserve"], 1);
        assert_eq!(out["time_chaf1a"], "01:00");
    }

    #[test]
    fn empty_update_is_empty() {
        assert!(SettingsUpdate::default().is_empty());
        assert!(!SettingsUpdate::minimum_soc(10).is_empty());
    }
}
