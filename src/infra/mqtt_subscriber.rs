use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::app::ingest_use_case::{IngestStatus, IngestionHandler};
use crate::error::{PipelineError, Result};
use crate::infra::mqtt_transport::MqttSettings;

/// Subscriber sessions acknowledge a message only after the handler has run,
/// so a crash mid-handler leaves it for redelivery.
pub fn subscriber_options(settings: &MqttSettings) -> Result<MqttOptions> {
    let mut options = settings.to_options()?;
    options.set_manual_acks(true);
    Ok(options)
}

/// Subscribe to `topic_filter` and run the handler once per delivered message,
/// until Ctrl-C. Returns the number of messages handled.
pub async fn run_subscriber(settings: &MqttSettings, topic_filter: &str, handler: &IngestionHandler) -> Result<usize> {
    let (client, mut eventloop) = AsyncClient::new(subscriber_options(settings)?, 100);

    client
        .subscribe(topic_filter, QoS::AtLeastOnce)
        .await
        .map_err(|e| PipelineError::Transport(format!("Failed to subscribe: {}", e)))?;

    info!(topic = %topic_filter, "subscribed to MQTT topic");

    let mut handled = 0usize;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("shutdown signal received");
                request_disconnect(&client).await;
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_message(handler, &publish.topic, &publish.payload).await;
                        acknowledge(&client, &publish).await;
                        handled += 1;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(PipelineError::Transport(format!("MQTT event loop error: {}", e)));
                    }
                }
            }
        }
    }

    info!(handled, "MQTT subscriber stopped");
    Ok(handled)
}

/// One handler invocation per message, in its own root span.
async fn handle_message(handler: &IngestionHandler, topic: &str, payload: &[u8]) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
    );

    async {
        let result = handler.handle_payload(payload).await;
        match result.status {
            IngestStatus::Ok => debug!(key = %result.archive_key, "message ingested"),
            IngestStatus::Partial => warn!(errors = ?result.errors, "message partially ingested"),
            IngestStatus::Failed => error!(errors = ?result.errors, "message ingestion failed"),
        }
    }
    .instrument(span)
    .await
}

/// Queue the PUBACK for a handled message. Returns false if it could not be queued.
async fn acknowledge(client: &AsyncClient, publish: &Publish) -> bool {
    match client.ack(publish).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, pkid = publish.pkid, "ack failed");
            false
        }
    }
}

async fn request_disconnect(client: &AsyncClient) -> bool {
    match client.disconnect().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "disconnect failed");
            false
        }
    }
}
