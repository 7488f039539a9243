use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::app::ports::{DeliveryQuality, TelemetryTransport};
use crate::constants::{DEFAULT_CLIENT_ID, DEFAULT_PROGRESS_EVERY, DEFAULT_PUBLISH_INTERVAL_MS, DEFAULT_TOPIC};
use crate::error::{PipelineError, Result};
use crate::metrics::ProducerMetrics;
use crate::pipeline::source::SourceRecord;
use crate::pipeline::telemetry::TelemetryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Disconnected,
    Connected,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub device_id: String,
    pub topic: String,
    /// Pause after each publish.
    pub interval: Duration,
    pub max_count: Option<usize>,
    pub progress_every: usize,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_CLIENT_ID.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            interval: Duration::from_millis(DEFAULT_PUBLISH_INTERVAL_MS),
            max_count: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// Replays source rows as device telemetry over a transport session.
pub struct TelemetryProducer<T: TelemetryTransport> {
    transport: T,
    settings: ProducerSettings,
    state: ProducerState,
    sent: usize,
}

impl<T: TelemetryTransport> TelemetryProducer<T> {
    pub fn new(transport: T, settings: ProducerSettings) -> Self {
        Self {
            transport,
            settings,
            state: ProducerState::Disconnected,
            sent: 0,
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Publish every record in order and return how many were acknowledged.
    ///
    /// Connect must succeed before anything is sent. Disconnect is attempted
    /// before returning in every case, including a failed connect.
    pub async fn run<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<SourceRecord>>,
    {
        self.sent = 0;

        info!(topic = %self.settings.topic, "Connecting...");
        let outcome = match self.transport.connect().await {
            Ok(()) => {
                self.state = ProducerState::Connected;
                info!("Connected!");
                self.stream(records).await
            }
            Err(e) => {
                error!(error = %e, "connect failed");
                Err(e)
            }
        };

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
        self.state = ProducerState::Disconnected;

        match outcome {
            Ok(()) => {
                info!(sent = self.sent, "Disconnected. Total sent: {}", self.sent);
                Ok(self.sent)
            }
            Err(e) => {
                error!(sent = self.sent, error = %e, "stream aborted");
                Err(PipelineError::StreamAborted {
                    sent: self.sent,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn stream<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<SourceRecord>>,
    {
        self.state = ProducerState::Streaming;

        for row in records {
            if self.settings.max_count.is_some_and(|max| self.sent >= max) {
                break;
            }

            let record = TelemetryRecord::build(&self.settings.device_id, Utc::now(), &row?);
            let payload = record.to_payload()?;
            let len = payload.len();

            if let Err(e) = self
                .transport
                .publish(&self.settings.topic, payload, DeliveryQuality::AtLeastOnce)
                .await
            {
                ProducerMetrics::record_publish_error();
                return Err(e);
            }
            ProducerMetrics::record_published(len);
            self.sent += 1;
            debug!(sent = self.sent, "record acknowledged");

            if self.settings.progress_every > 0 && self.sent % self.settings.progress_every == 0 {
                info!("Sent {} rows...", self.sent);
            }

            if self.settings.max_count.is_some_and(|max| self.sent >= max) {
                break;
            }

            if !self.settings.interval.is_zero() {
                tokio::time::sleep(self.settings.interval).await;
            }
        }

        Ok(())
    }
}
