mod common;
use common::*;

use neovolt_bridge::coordinator::CallStats;
use neovolt_bridge::mqtt::Mqtt;
use neovolt_bridge::prelude::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

// no broker is listening in the test environment, so the event loop sits
// in its reconnect cycle the whole time; stop() still has to wind down
// both the sender and the receiver or the daemon never exits
#[tokio::test]
async fn stop_shuts_down_sender_and_receiver() {
    common_setup();

    let config = Factory::config_wrapper();
    let channels = Channels::new();
    let stats = Arc::new(Mutex::new(CallStats::default()));

    let mqtt = Mqtt::new(config, channels.clone(), stats);
    let runner = {
        let mqtt = mqtt.clone();
        tokio::spawn(async move { mqtt.start().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    mqtt.stop().await.unwrap();

    // the receiver may sit through a couple of reconnect backoffs first
    let result = tokio::time::timeout(Duration::from_secs(15), runner)
        .await
        .expect("mqtt loops did not shut down");
    result.unwrap().unwrap();
}
