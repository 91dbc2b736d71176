mod common;
use common::*;

use neovolt_bridge::coordinator::ChannelData;
use neovolt_bridge::prelude::*;

use std::time::Duration;

async fn expect_message(receiver: &mut broadcast::Receiver<mqtt::ChannelData>) -> mqtt::Message {
    match tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await {
        Ok(Ok(mqtt::ChannelData::Message(message))) => message,
        other => panic!("expected an mqtt message, got {:?}", other),
    }
}

#[tokio::test]
async fn read_stats_publishes_breaker_state_and_counters() {
    common_setup();

    let channels = Channels::new();
    let coordinator = Coordinator::new(Factory::config_wrapper(), channels.clone()).unwrap();
    let mut to_mqtt = channels.to_mqtt.subscribe();

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await });
    }

    // let the coordinator subscribe to to_coordinator before sending
    tokio::task::yield_now().await;

    channels
        .to_coordinator
        .send(ChannelData::Command(Command::ReadStats(Factory::account())))
        .unwrap();

    // the report comes first, then the OK on the result topic
    let report = expect_message(&mut to_mqtt).await;
    assert_eq!(report.topic, "home/stats");
    assert!(!report.retain);

    let body: serde_json::Value = serde_json::from_str(&report.payload).unwrap();
    assert_eq!(body["circuit_breaker"], "closed");
    assert_eq!(body["success_rate"], 1.0);
    assert_eq!(body["total_failures"], 0);
    assert_eq!(body["commands_received"], 1);
    assert_eq!(body["cloud_calls"], 0);
    assert!(body["last_error"].is_null());

    let result = expect_message(&mut to_mqtt).await;
    assert_eq!(result.topic, "result/home/read_stats");
    assert_eq!(result.payload, "OK");
}
