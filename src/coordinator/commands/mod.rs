pub mod read_power;
pub mod read_settings;
pub mod update_settings;
