use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::normalize::CanonicalMessage;

/// A row in the readings table, keyed by `(device_id, ts)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRecord {
    pub device_id: String,
    /// Ingestion time, epoch milliseconds.
    pub ts: i64,
    pub data: CanonicalMessage,
}

// Handler-side ports
#[async_trait]
pub trait ReadingTable: Send + Sync {
    /// Insert or overwrite the record at `(device_id, ts)`.
    async fn put_reading(&self, record: &StorageRecord) -> Result<()>;
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store `body` at `key` and return the key as the backend stored it.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;
}

// Producer-side port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryQuality {
    AtMostOnce,
    AtLeastOnce,
}

/// A publish/subscribe session. Each call completes only once the broker has
/// acknowledged it (for `AtLeastOnce` publishes).
#[async_trait]
pub trait TelemetryTransport: Send {
    async fn connect(&mut self) -> Result<()>;
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, quality: DeliveryQuality) -> Result<()>;
    async fn disconnect(&mut self) -> Result<()>;
}
