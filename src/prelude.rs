pub use std::str::FromStr;

pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::{broadcast, oneshot};

pub use crate::{file_error, file_error_with_source};

pub use crate::channels::Channels;
pub use crate::command::Command;
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator::{self, Coordinator};
pub use crate::mqtt;
pub use crate::options::Options;
pub use crate::service;
pub use crate::settings::{BatterySettings, SettingsUpdate};
pub use crate::settings_cache::{self, SettingsCache};
pub use crate::time_utils;
