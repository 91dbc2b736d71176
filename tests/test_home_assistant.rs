mod common;
use common::*;

use neovolt_bridge::home_assistant;
use neovolt_bridge::prelude::*;

fn discovery_messages() -> Vec<mqtt::Message> {
    let config = Factory::config();
    home_assistant::Config::new(&config.accounts[0], &config.mqtt)
        .all()
        .unwrap()
}

#[test]
fn emits_one_entity_per_controllable_setting() {
    common_setup();

    let messages = discovery_messages();
    assert_eq!(messages.len(), 7);

    let topics: Vec<&str> = messages.iter().map(|m| m.topic.as_str()).collect();
    assert!(topics.contains(&"homeassistant/number/home/bat_use_cap/config"));
    assert!(topics.contains(&"homeassistant/text/home/time_chaf1a/config"));
    assert!(topics.contains(&"homeassistant/text/home/time_chae1a/config"));
    assert!(topics.contains(&"homeassistant/text/home/time_disf1a/config"));
    assert!(topics.contains(&"homeassistant/text/home/time_dise1a/config"));
    assert!(topics.contains(&"homeassistant/switch/home/ctr_dis/config"));
    assert!(topics.contains(&"homeassistant/switch/home/grid_charge/config"));

    // discovery configs must be retained or entities vanish on HA restart
    assert!(messages.iter().all(|m| m.retain));
}

#[test]
fn soc_entity_commands_the_soc_service() {
    common_setup();

    let messages = discovery_messages();
    let soc = messages
        .iter()
        .find(|m| m.topic.contains("bat_use_cap"))
        .unwrap();

    let body: serde_json::Value = serde_json::from_str(&soc.payload).unwrap();
    assert_eq!(body["command_topic"], "neovolt/cmd/home/set_minimum_soc");
    assert_eq!(body["state_topic"], "neovolt/home/settings");
    assert_eq!(body["value_template"], "{{ value_json.bat_use_cap }}");
    assert_eq!(body["min"], 1);
    assert_eq!(body["max"], 100);
    assert_eq!(body["step"], 1);
    assert_eq!(body["unit_of_measurement"], "%");
    assert_eq!(body["availability"]["topic"], "neovolt/LWT");
}

#[test]
fn time_entities_validate_hh_mm_and_command_their_services() {
    common_setup();

    let messages = discovery_messages();

    for (wire_field, command_topic) in [
        ("time_chaf1a", "neovolt/cmd/home/set_charge_start_time"),
        ("time_chae1a", "neovolt/cmd/home/set_charge_end_time"),
        ("time_disf1a", "neovolt/cmd/home/set_discharge_start_time"),
        ("time_dise1a", "neovolt/cmd/home/set_discharge_time"),
    ] {
        let message = messages
            .iter()
            .find(|m| m.topic.contains(wire_field))
            .unwrap_or_else(|| panic!("no discovery message for {}", wire_field));

        let body: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(body["command_topic"], command_topic, "{}", wire_field);
        assert_eq!(
            body["value_template"],
            format!("{{{{ value_json.{} }}}}", wire_field)
        );
        assert_eq!(body["pattern"], "^([01][0-9]|2[0-3]):[0-5][0-9]$");
    }
}

#[test]
fn switch_entities_speak_the_apis_zero_one_ints() {
    common_setup();

    let messages = discovery_messages();

    for (wire_field, command_topic) in [
        ("ctr_dis", "neovolt/cmd/home/set_discharge_control"),
        ("grid_charge", "neovolt/cmd/home/set_grid_charge"),
    ] {
        let message = messages
            .iter()
            .find(|m| m.topic.contains(wire_field))
            .unwrap_or_else(|| panic!("no discovery message for {}", wire_field));

        let body: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(body["command_topic"], command_topic, "{}", wire_field);
        assert_eq!(body["state_topic"], "neovolt/home/settings");
        assert_eq!(
            body["value_template"],
            format!("{{{{ value_json.{} }}}}", wire_field)
        );
        assert_eq!(body["state_on"], "1");
        assert_eq!(body["state_off"], "0");
        assert_eq!(body["payload_on"], "1");
        assert_eq!(body["payload_off"], "0");
    }
}

#[test]
fn entities_share_one_device_per_account() {
    common_setup();

    let messages = discovery_messages();

    for message in &messages {
        let body: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(body["device"]["identifiers"][0], "neovolt_home");
    }
}
