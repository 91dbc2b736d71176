pub mod channels;
pub mod cloud;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod home_assistant;
pub mod monitor;
pub mod mqtt;
pub mod options;
pub mod prelude;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod settings_cache;
pub mod time_utils;

pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::mqtt::Mqtt;
use crate::scheduler::Scheduler;

pub async fn app(mut shutdown_rx: broadcast::Receiver<()>, config: ConfigWrapper) -> Result<()> {
    info!("neovolt-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    // settings cache first, everything else leans on it
    let settings_cache = SettingsCache::new(channels.clone());
    let settings_cache_handle = tokio::spawn(async move {
        if let Err(e) = settings_cache.start().await {
            error!("settings cache task failed: {}", e);
        }
    });

    let coordinator = Coordinator::new(config.clone(), channels.clone())?;
    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("coordinator task failed: {}", e);
        }
    });

    let scheduler = Scheduler::new(config.clone(), channels.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("scheduler task failed: {}", e);
        }
    });

    let mqtt = Mqtt::new(config.clone(), channels.clone(), coordinator.stats.clone());
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("mqtt task failed: {}", e);
        }
    });

    info!("components started, waiting for shutdown signal");
    let _ = shutdown_rx.recv().await;

    info!("shutdown signal received, stopping components");
    coordinator.stop();
    let _ = mqtt.stop().await;
    let _ = channels
        .read_settings_cache
        .send(settings_cache::ChannelData::Shutdown);
    let _ = channels
        .to_settings_cache
        .send(settings_cache::ChannelData::Shutdown);

    // scheduler has no channel of its own; dropping its task is fine
    scheduler_handle.abort();

    if let Err(e) = coordinator_handle.await {
        error!("error waiting for coordinator task: {}", e);
    }
    if let Err(e) = mqtt_handle.await {
        error!("error waiting for mqtt task: {}", e);
    }
    if let Err(e) = settings_cache_handle.await {
        error!("error waiting for settings cache task: {}", e);
    }

    info!("shutdown complete");
    Ok(())
}

pub async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let config = ConfigWrapper::from_config(config);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    app(shutdown_rx, config).await
}
