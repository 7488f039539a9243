use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use tracing::{debug, info};

use crate::app::ports::{DeliveryQuality, TelemetryTransport};
use crate::error::{PipelineError, Result};

/// PEM files for a mutually authenticated TLS session.
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// `None` connects over plain TCP (local brokers only).
    pub tls: Option<TlsFiles>,
}

impl MqttSettings {
    pub fn to_options(&self) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(tls) = &self.tls {
            let read = |path: &PathBuf| {
                std::fs::read(path).map_err(|e| {
                    PipelineError::Config(format!("Failed to read '{}': {}", path.display(), e))
                })
            };
            let config = TlsConfiguration::Simple {
                ca: read(&tls.ca_path)?,
                alpn: None,
                client_auth: Some((read(&tls.cert_path)?, read(&tls.key_path)?)),
            };
            options.set_transport(Transport::tls_with_config(config));
        }
        Ok(options)
    }
}

fn qos(quality: DeliveryQuality) -> QoS {
    match quality {
        DeliveryQuality::AtMostOnce => QoS::AtMostOnce,
        DeliveryQuality::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// MQTT session driven inline: every call polls the event loop until the
/// broker has answered, so nothing runs in the background between calls.
pub struct MqttTransport {
    settings: MqttSettings,
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttTransport {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut (AsyncClient, EventLoop)> {
        self.session
            .as_mut()
            .ok_or_else(|| PipelineError::Transport("not connected".to_string()))
    }
}

#[async_trait]
impl TelemetryTransport for MqttTransport {
    async fn connect(&mut self) -> Result<()> {
        let options = self.settings.to_options()?;
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(PipelineError::Transport(format!("connection refused: {:?}", ack.code)));
                    }
                    break;
                }
                Ok(event) => debug!(?event, "waiting for CONNACK"),
                Err(e) => return Err(PipelineError::Transport(format!("connect failed: {}", e))),
            }
        }

        info!(
            host = %self.settings.host,
            port = self.settings.port,
            client_id = %self.settings.client_id,
            "connected to MQTT broker"
        );
        self.session = Some((client, eventloop));
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, quality: DeliveryQuality) -> Result<()> {
        let (client, eventloop) = self.session()?;

        client
            .publish(topic, qos(quality), false, payload)
            .await
            .map_err(|e| PipelineError::Transport(format!("publish failed: {}", e)))?;

        // QoS 0 completes once the packet is written; QoS 1 waits for the PUBACK
        // of the packet id assigned on the way out.
        let mut pkid = None;
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(id))) => {
                    if quality == DeliveryQuality::AtMostOnce {
                        return Ok(());
                    }
                    pkid = Some(id);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) if Some(ack.pkid) == pkid => return Ok(()),
                Ok(event) => debug!(?event, "waiting for PUBACK"),
                Err(e) => return Err(PipelineError::Transport(format!("publish failed: {}", e))),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some((client, mut eventloop)) = self.session.take() else {
            return Ok(());
        };

        client
            .disconnect()
            .await
            .map_err(|e| PipelineError::Transport(format!("disconnect failed: {}", e)))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => return Err(PipelineError::Transport(format!("disconnect failed: {}", e))),
            }
        }

        info!(client_id = %self.settings.client_id, "disconnected from MQTT broker");
        Ok(())
    }
}
