use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Legacy service; behaves like SetDischargeEndTime
    SetDischargeTime(config::Account, String),
    SetDischargeStartTime(config::Account, String),
    SetChargeStartTime(config::Account, String),
    SetChargeEndTime(config::Account, String),
    SetMinimumSoc(config::Account, i64),
    SetChargeCap(config::Account, i64),
    SetDischargeControl(config::Account, bool),
    SetGridCharge(config::Account, bool),
    UpdateBatterySettings(config::Account, SettingsUpdate),
    ReadSettings(config::Account),
    ReadPowerData(config::Account),
    ReadStats(config::Account),
    ForceReconnect(config::Account),
}

impl Command {
    pub fn account(&self) -> &config::Account {
        use Command::*;

        match self {
            SetDischargeTime(account, _)
            | SetDischargeStartTime(account, _)
            | SetChargeStartTime(account, _)
            | SetChargeEndTime(account, _)
            | SetMinimumSoc(account, _)
            | SetChargeCap(account, _)
            | SetDischargeControl(account, _)
            | SetGridCharge(account, _)
            | UpdateBatterySettings(account, _)
            | ReadSettings(account)
            | ReadPowerData(account)
            | ReadStats(account)
            | ForceReconnect(account) => account,
        }
    }

    /// The partial update this command applies, if it is a write command.
    pub fn to_settings_update(&self) -> Option<SettingsUpdate> {
        use Command::*;

        match self {
            SetDischargeTime(_, time) => Some(SettingsUpdate::discharge_end(time.clone())),
            SetDischargeStartTime(_, time) => Some(SettingsUpdate::discharge_start(time.clone())),
            SetChargeStartTime(_, time) => Some(SettingsUpdate::charge_start(time.clone())),
            SetChargeEndTime(_, time) => Some(SettingsUpdate::charge_end(time.clone())),
            SetMinimumSoc(_, soc) => Some(SettingsUpdate::minimum_soc(*soc)),
            SetChargeCap(_, cap) => Some(SettingsUpdate::charge_cap(*cap)),
            SetDischargeControl(_, enabled) => Some(SettingsUpdate::discharge_control(*enabled)),
            SetGridCharge(_, enabled) => Some(SettingsUpdate::grid_charge(*enabled)),
            UpdateBatterySettings(_, update) => Some(update.clone()),
            ReadSettings(_) | ReadPowerData(_) | ReadStats(_) | ForceReconnect(_) => None,
        }
    }

    pub fn to_result_topic(&self) -> String {
        use Command::*;

        let service = match self {
            SetDischargeTime(_, _) => service::SET_DISCHARGE_TIME,
            SetDischargeStartTime(_, _) => service::SET_DISCHARGE_START_TIME,
            SetChargeStartTime(_, _) => service::SET_CHARGE_START_TIME,
            SetChargeEndTime(_, _) => service::SET_CHARGE_END_TIME,
            SetMinimumSoc(_, _) => service::SET_MINIMUM_SOC,
            SetChargeCap(_, _) => "set_charge_cap",
            SetDischargeControl(_, _) => "set_discharge_control",
            SetGridCharge(_, _) => "set_grid_charge",
            UpdateBatterySettings(_, _) => service::UPDATE_BATTERY_SETTINGS,
            ReadSettings(_) => "read_settings",
            ReadPowerData(_) => "read_power_data",
            ReadStats(_) => "read_stats",
            ForceReconnect(_) => "force_reconnect",
        };

        format!("result/{}/{}", self.account().name(), service)
    }
}
