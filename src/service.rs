use crate::prelude::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// The six user-invocable services. These identifiers are part of the
// external interface and must not change; automations address us by them.
pub const SET_DISCHARGE_TIME: &str = "set_discharge_time"; // legacy alias for end_discharge
pub const SET_DISCHARGE_START_TIME: &str = "set_discharge_start_time";
pub const SET_CHARGE_START_TIME: &str = "set_charge_start_time";
pub const SET_CHARGE_END_TIME: &str = "set_charge_end_time";
pub const SET_MINIMUM_SOC: &str = "set_minimum_soc";
pub const UPDATE_BATTERY_SETTINGS: &str = "update_battery_settings";

// Field keys shared between the single-purpose services and the batched one.
pub const FIELD_END_DISCHARGE: &str = "end_discharge";
pub const FIELD_START_DISCHARGE: &str = "start_discharge";
pub const FIELD_START_CHARGE: &str = "start_charge";
pub const FIELD_END_CHARGE: &str = "end_charge";
pub const FIELD_MINIMUM_SOC: &str = "minimum_soc";

pub const SOC_MIN: i64 = 1;
pub const SOC_MAX: i64 = 100;

/// Typed UI/validation hint for a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Time of day, HH:MM
    Time {},
    Number {
        min: i64,
        max: i64,
        step: i64,
        unit_of_measurement: String,
    },
}

impl Selector {
    fn soc_percent() -> Self {
        Selector::Number {
            min: SOC_MIN,
            max: SOC_MAX,
            step: 1,
            unit_of_measurement: "%".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub description: String,
    pub example: String,
    pub required: bool,
    pub selector: Selector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub description: String,
    pub fields: BTreeMap<String, Field>,
}

/// The declarative schema for every service the bridge accepts.
///
/// Loaded once at startup; the coordinator re-validates every incoming call
/// against it. UI-level validation (Home Assistant, scripts, raw MQTT) is
/// not guaranteed to have happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub services: BTreeMap<String, Service>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut services = BTreeMap::new();

        services.insert(
            SET_DISCHARGE_TIME.to_string(),
            Service {
                name: "Set Discharge Time".to_string(),
                description: "Set the battery discharge end time (legacy, use set_discharge_start_time/set_charge_end_time instead)".to_string(),
                fields: BTreeMap::from([(
                    FIELD_END_DISCHARGE.to_string(),
                    Field {
                        name: "End Discharge Time".to_string(),
                        description: "Time to end battery discharge (format HH:MM)".to_string(),
                        example: "23:00".to_string(),
                        required: true,
                        selector: Selector::Time {},
                    },
                )]),
            },
        );

        services.insert(
            SET_DISCHARGE_START_TIME.to_string(),
            Service {
                name: "Set Discharge Start Time".to_string(),
                description: "Set the battery discharge start time".to_string(),
                fields: BTreeMap::from([(
                    FIELD_START_DISCHARGE.to_string(),
                    Field {
                        name: "Start Discharge Time".to_string(),
                        description: "Time to start battery discharge (format HH:MM)".to_string(),
                        example: "16:00".to_string(),
                        required: true,
                        selector: Selector::Time {},
                    },
                )]),
            },
        );

        services.insert(
            SET_CHARGE_START_TIME.to_string(),
            Service {
                name: "Set Charge Start Time".to_string(),
                description: "Set the battery charge start time".to_string(),
                fields: BTreeMap::from([(
                    FIELD_START_CHARGE.to_string(),
                    Field {
                        name: "Start Charge Time".to_string(),
                        description: "Time to start battery charging (format HH:MM)".to_string(),
                        example: "14:30".to_string(),
                        required: true,
                        selector: Selector::Time {},
                    },
                )]),
            },
        );

        services.insert(
            SET_CHARGE_END_TIME.to_string(),
            Service {
                name: "Set Charge End Time".to_string(),
                description: "Set the battery charge end time".to_string(),
                fields: BTreeMap::from([(
                    FIELD_END_CHARGE.to_string(),
                    Field {
                        name: "End Charge Time".to_string(),
                        description: "Time to end battery charging (format HH:MM)".to_string(),
                        example: "16:00".to_string(),
                        required: true,
                        selector: Selector::Time {},
                    },
                )]),
            },
        );

        services.insert(
            SET_MINIMUM_SOC.to_string(),
            Service {
                name: "Set Minimum SOC".to_string(),
                description: "Set the minimum state of charge the battery will discharge to".to_string(),
                fields: BTreeMap::from([(
                    FIELD_MINIMUM_SOC.to_string(),
                    Field {
                        name: "Minimum SOC".to_string(),
                        description: "Minimum state of charge percentage to maintain".to_string(),
                        example: "10".to_string(),
                        required: true,
                        selector: Selector::soc_percent(),
                    },
                )]),
            },
        );

        // the batched action: union of the five single-purpose fields, all
        // optional. only the fields provided are written to the inverter.
        let mut update_fields = BTreeMap::new();
        for key in [
            SET_DISCHARGE_TIME,
            SET_DISCHARGE_START_TIME,
            SET_CHARGE_START_TIME,
            SET_CHARGE_END_TIME,
            SET_MINIMUM_SOC,
        ] {
            for (field_key, field) in &services[key].fields {
                let mut field = field.clone();
                field.required = false;
                update_fields.insert(field_key.clone(), field);
            }
        }
        services.insert(
            UPDATE_BATTERY_SETTINGS.to_string(),
            Service {
                name: "Update Battery Settings".to_string(),
                description: "Update multiple battery settings in a single call; unset fields are left untouched".to_string(),
                fields: update_fields,
            },
        );

        Self { services }
    }

    pub fn get(&self, service: &str) -> Option<&Service> {
        self.services.get(service)
    }

    /// Validate a service call payload against the declared schema and turn
    /// it into a partial settings update.
    ///
    /// Time fields are normalized to HH:MM, number fields bounds-checked.
    /// Unknown service identifiers and unknown field keys are rejected.
    pub fn validate(
        &self,
        service: &str,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SettingsUpdate> {
        let declaration = self
            .get(service)
            .ok_or_else(|| anyhow!("unknown service: {}", service))?;

        for key in payload.keys() {
            if !declaration.fields.contains_key(key.as_str()) {
                bail!("service {} has no field {}", service, key);
            }
        }

        let mut update = SettingsUpdate::default();

        for (key, field) in &declaration.fields {
            let value = match payload.get(key.as_str()) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if field.required {
                        bail!("service {} requires field {}", service, key);
                    }
                    continue;
                }
            };

            match &field.selector {
                Selector::Time {} => {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| anyhow!("field {} must be a HH:MM string", key))?;
                    let time = time_utils::sanitize_time_format(raw)?;
                    update.set_time_field(key, time)?;
                }
                Selector::Number { min, max, .. } => {
                    let n = value
                        .as_i64()
                        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                        .ok_or_else(|| anyhow!("field {} must be an integer", key))?;
                    if n < *min || n > *max {
                        bail!("field {} must be between {} and {}, got {}", key, min, max, n);
                    }
                    update.set_number_field(key, n)?;
                }
            }
        }

        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn validate_normalizes_time() {
        let registry = Registry::new();
        let update = registry
            .validate(
                SET_CHARGE_START_TIME,
                &payload(&[(FIELD_START_CHARGE, serde_json::json!("2:30 PM"))]),
            )
            .unwrap();
        assert_eq!(update.charge_start_time.as_deref(), Some("14:30"));
    }

    #[test]
    fn validate_rejects_missing_required_field() {
        let registry = Registry::new();
        assert!(registry.validate(SET_MINIMUM_SOC, &payload(&[])).is_err());
    }

    #[test]
    fn validate_rejects_unknown_field() {
        let registry = Registry::new();
        let err = registry
            .validate(
                SET_MINIMUM_SOC,
                &payload(&[
                    (FIELD_MINIMUM_SOC, serde_json::json!(20)),
                    ("bogus", serde_json::json!(1)),
                ]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn validate_bounds_checks_soc() {
        let registry = Registry::new();
        assert!(registry
            .validate(SET_MINIMUM_SOC, &payload(&[(FIELD_MINIMUM_SOC, serde_json::json!(0))]))
            .is_err());
        assert!(registry
            .validate(SET_MINIMUM_SOC, &payload(&[(FIELD_MINIMUM_SOC, serde_json::json!(101))]))
            .is_err());

        let update = registry
            .validate(SET_MINIMUM_SOC, &payload(&[(FIELD_MINIMUM_SOC, serde_json::json!(100))]))
            .unwrap();
        assert_eq!(update.minimum_soc, Some(100));
    }

    #[test]
    fn validate_accepts_numeric_string_soc() {
        let registry = Registry::new();
        let update = registry
            .validate(SET_MINIMUM_SOC, &payload(&[(FIELD_MINIMUM_SOC, serde_json::json!("15"))]))
            .unwrap();
        assert_eq!(update.minimum_soc, Some(15));
    }

    #[test]
    fn batched_update_accepts_partial_payload() {
        let registry = Registry::new();
        let update = registry
            .validate(
                UPDATE_BATTERY_SETTINGS,
                &payload(&[
                    (FIELD_END_DISCHARGE, serde_json::json!("23:00")),
                    (FIELD_MINIMUM_SOC, serde_json::json!(10)),
                ]),
            )
            .unwrap();
        assert_eq!(update.discharge_end_time.as_deref(), Some("23:00"));
        assert_eq!(update.minimum_soc, Some(10));
        assert_eq!(update.charge_start_time, None);
        assert_eq!(update.charge_end_time, None);
        assert_eq!(update.discharge_start_time, None);
    }

    #[test]
    fn batched_update_with_empty_payload_is_empty() {
        let registry = Registry::new();
        let update = registry.validate(UPDATE_BATTERY_SETTINGS, &payload(&[])).unwrap();
        assert!(update.is_empty());
    }
}
