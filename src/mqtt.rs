use crate::prelude::*;

use crate::coordinator::CallStats;
use crate::home_assistant;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Publish, QoS};
use std::sync::{Arc, Mutex};

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

pub enum TargetAccount {
    Name(String),
    All,
}

impl Message {
    pub fn for_settings(account: &str, settings: &BatterySettings) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/settings", account),
            retain: true,
            payload: serde_json::to_string(settings)?,
        })
    }

    pub fn for_power_data(account: &str, power: &crate::settings::PowerData) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/power", account),
            retain: false,
            payload: serde_json::to_string(power)?,
        })
    }

    /// Map a cmd topic + payload onto a command, re-validating the payload
    /// against the service registry. Scripted callers bypass any UI
    /// validation, so nothing in the payload is trusted.
    pub fn to_command(
        &self,
        account: config::Account,
        registry: &service::Registry,
    ) -> Result<Command> {
        use Command::*;

        let (_target, parts) = self.split_cmd_topic()?;

        let r = match parts[..] {
            [service::SET_DISCHARGE_TIME] => {
                warn!(
                    "service {} is deprecated, use {} / {}",
                    service::SET_DISCHARGE_TIME,
                    service::SET_DISCHARGE_START_TIME,
                    service::SET_CHARGE_END_TIME
                );
                let update = registry.validate(
                    service::SET_DISCHARGE_TIME,
                    &self.payload_fields(service::FIELD_END_DISCHARGE)?,
                )?;
                let time = update
                    .discharge_end_time
                    .ok_or_else(|| anyhow!("no end_discharge time provided"))?;
                SetDischargeTime(account, time)
            }
            [service::SET_DISCHARGE_START_TIME] => {
                let update = registry.validate(
                    service::SET_DISCHARGE_START_TIME,
                    &self.payload_fields(service::FIELD_START_DISCHARGE)?,
                )?;
                let time = update
                    .discharge_start_time
                    .ok_or_else(|| anyhow!("no start_discharge time provided"))?;
                SetDischargeStartTime(account, time)
            }
            [service::SET_CHARGE_START_TIME] => {
                let update = registry.validate(
                    service::SET_CHARGE_START_TIME,
                    &self.payload_fields(service::FIELD_START_CHARGE)?,
                )?;
                let time = update
                    .charge_start_time
                    .ok_or_else(|| anyhow!("no start_charge time provided"))?;
                SetChargeStartTime(account, time)
            }
            [service::SET_CHARGE_END_TIME] => {
                let update = registry.validate(
                    service::SET_CHARGE_END_TIME,
                    &self.payload_fields(service::FIELD_END_CHARGE)?,
                )?;
                let time = update
                    .charge_end_time
                    .ok_or_else(|| anyhow!("no end_charge time provided"))?;
                SetChargeEndTime(account, time)
            }
            [service::SET_MINIMUM_SOC] => {
                let update = registry.validate(
                    service::SET_MINIMUM_SOC,
                    &self.payload_fields(service::FIELD_MINIMUM_SOC)?,
                )?;
                let soc = update
                    .minimum_soc
                    .ok_or_else(|| anyhow!("no minimum_soc provided"))?;
                SetMinimumSoc(account, soc)
            }
            [service::UPDATE_BATTERY_SETTINGS] => {
                let update =
                    registry.validate(service::UPDATE_BATTERY_SETTINGS, &self.payload_object()?)?;
                if update.is_empty() {
                    bail!("no battery settings provided, nothing to update");
                }
                UpdateBatterySettings(account, update)
            }
            // settings the batched service doesn't cover; exposed to HA as
            // switch entities and to scripts as plain topics
            ["set_charge_cap"] => {
                let cap = self.payload_int()?;
                if !(service::SOC_MIN..=service::SOC_MAX).contains(&cap) {
                    bail!(
                        "charge cap must be between {} and {}, got {}",
                        service::SOC_MIN,
                        service::SOC_MAX,
                        cap
                    );
                }
                SetChargeCap(account, cap)
            }
            ["set_discharge_control"] => SetDischargeControl(account, self.payload_bool()),
            ["set_grid_charge"] => SetGridCharge(account, self.payload_bool()),
            ["read", "settings"] => ReadSettings(account),
            ["read", "power"] => ReadPowerData(account),
            ["read", "stats"] => ReadStats(account),
            ["force_reconnect"] => ForceReconnect(account),
            [..] => bail!("unhandled: {:?}", self),
        };

        Ok(r)
    }

    // given a cmd Message, return the account it is intended for.
    //
    // eg cmd/home/set_minimum_soc => (home, ['set_minimum_soc'])
    pub fn split_cmd_topic(&self) -> Result<(TargetAccount, Vec<&str>)> {
        let parts: Vec<&str> = self.topic.split('/').collect();

        // bail if the topic is too short to handle.
        // this *shouldn't* happen as our subscribe is for neovolt/cmd/{account}/#
        if parts.len() < 2 {
            bail!("ignoring badly formed MQTT topic: {}", self.topic);
        }

        // parts[0] should be cmd
        let account = parts[1];
        let rest = parts[2..].to_vec();

        if account == "all" {
            Ok((TargetAccount::All, rest))
        } else {
            Ok((TargetAccount::Name(account.to_string()), rest))
        }
    }

    // single-purpose services accept either the bare value ("23:00") or a
    // JSON object keyed by the declared field
    fn payload_fields(&self, field_key: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&self.payload) {
            return Ok(map);
        }

        let mut map = serde_json::Map::new();
        map.insert(
            field_key.to_string(),
            serde_json::Value::String(self.payload.trim().to_string()),
        );
        Ok(map)
    }

    fn payload_int(&self) -> Result<i64> {
        self.payload
            .trim()
            .parse()
            .map_err(|err| anyhow!("payload_int: {}", err))
    }

    fn payload_bool(&self) -> bool {
        matches!(
            self.payload.to_ascii_lowercase().as_str(),
            "1" | "t" | "true" | "on" | "y" | "yes"
        )
    }

    fn payload_object(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::from_str(&self.payload) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => bail!(
                "expected a JSON object payload, got: {}",
                self.payload
            ),
        }
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<CallStats>>,
}

impl Mqtt {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        shared_stats: Arc<Mutex<CallStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = &self.config;

        if !c.mqtt().enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new("neovolt-bridge", c.mqtt().host(), c.mqtt().port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.mqtt().username(), c.mqtt().password()) {
            options.set_credentials(u.clone(), p.clone());
        }

        info!(
            "initializing mqtt at {}:{}",
            c.mqtt().host(),
            c.mqtt().port()
        );

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(
            self.setup(client.clone()),
            self.receiver(eventloop),
            self.sender(client)
        )?;

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
        Ok(())
    }

    async fn setup(&self, client: AsyncClient) -> Result<()> {
        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        client
            .subscribe(
                format!("{}/cmd/all/#", self.config.mqtt().namespace()),
                QoS::AtMostOnce,
            )
            .await?;

        for account in self.config.enabled_accounts() {
            client
                .subscribe(
                    format!(
                        "{}/cmd/{}/#",
                        self.config.mqtt().namespace(),
                        account.name()
                    ),
                    QoS::AtMostOnce,
                )
                .await?;

            if self.config.homeassistant_enabled() {
                let ha = home_assistant::Config::new(&account, &self.config.mqtt());
                for msg in ha.all()?.into_iter() {
                    let _ = client
                        .publish(msg.topic, QoS::AtLeastOnce, msg.retain, msg.payload.into_bytes())
                        .await;
                }
            }
        }

        Ok(())
    }

    // mqtt -> coordinator
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        let mut shutdown = self.channels.to_mqtt.subscribe();

        loop {
            tokio::select! {
                message = shutdown.recv() => match message {
                    Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                        info!("MQTT receiver shutting down");
                        break;
                    }
                    _ => {} // outbound traffic, the sender's problem
                },
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        self.handle_message(publish)?;
                    }
                    Err(e) => {
                        error!("{}", e);
                        info!("reconnecting in 5s");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => {} // keepalives etc
                },
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    fn handle_message(&self, publish: Publish) -> Result<()> {
        // remove the namespace, including the first /
        // doing it this way means we don't break if namespace happens to contain a /
        let topic = publish.topic[self.config.mqtt().namespace().len() + 1..].to_owned();

        let message = Message {
            topic,
            retain: publish.retain,
            payload: String::from_utf8(publish.payload.to_vec())?,
        };
        debug!("RX: {:?}", message);
        if self
            .channels
            .from_mqtt
            .send(ChannelData::Message(message))
            .is_err()
        {
            bail!("send(from_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        use ChannelData::*;

        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            match receiver.recv().await? {
                Shutdown => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Message(message) => {
                    let topic = format!("{}/{}", self.config.mqtt().namespace(), message.topic);
                    debug!("publishing: {} = {}", topic, message.payload);
                    match client
                        .publish(
                            topic.as_str(),
                            QoS::AtLeastOnce,
                            message.retain,
                            message.payload.into_bytes(),
                        )
                        .await
                    {
                        Ok(_) => {
                            if let Ok(mut stats) = self.shared_stats.lock() {
                                stats.mqtt_messages_sent += 1;
                            }
                        }
                        Err(err) => {
                            error!("MQTT publish failed for {}: {:?}", topic, err);
                            if let Ok(mut stats) = self.shared_stats.lock() {
                                stats.mqtt_errors += 1;
                            }
                        }
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
