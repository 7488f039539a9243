use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::app::ports::{ArchiveStore, ReadingTable, StorageRecord};
use crate::constants::{ARCHIVE_CONTENT_TYPE, DEFAULT_KEY_PREFIX};
use crate::error::{PipelineError, Result};
use crate::metrics::HandlerMetrics;
use crate::pipeline::envelope::InboundMessage;
use crate::pipeline::normalize::normalize;
use crate::pipeline::partition::new_archive_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    Partial,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Ok => "ok",
            IngestStatus::Partial => "partial",
            IngestStatus::Failed => "failed",
        }
    }
}

/// Outcome of one handler invocation. Both sink outcomes are always reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResult {
    pub status: IngestStatus,
    #[serde(rename = "ddb_written")]
    pub table_written: bool,
    #[serde(rename = "s3_written")]
    pub archive_written: bool,
    #[serde(rename = "s3_key")]
    pub archive_key: String,
    pub device_id: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl IngestResult {
    /// Turn any unwritten sink into an error for hosts that treat partial
    /// success as a failed invocation.
    pub fn into_outcome(self) -> Result<IngestResult> {
        match self.status {
            IngestStatus::Ok => Ok(self),
            IngestStatus::Partial | IngestStatus::Failed => Err(PipelineError::SinkWrite {
                status: self.status.as_str().to_string(),
                message: self.errors.join("; "),
            }),
        }
    }
}

/// Normalizes inbound messages and writes each one to the readings table and
/// the archive.
pub struct IngestionHandler {
    table: Arc<dyn ReadingTable>,
    archive: Arc<dyn ArchiveStore>,
    key_prefix: String,
}

impl IngestionHandler {
    pub fn new(table: Arc<dyn ReadingTable>, archive: Arc<dyn ArchiveStore>) -> Self {
        Self {
            table,
            archive,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub async fn handle(&self, event: Value) -> IngestResult {
        self.handle_at(event, Utc::now()).await
    }

    /// Handle an event as if it arrived at `now`. The same instant drives the
    /// table sort key and the archive partition date.
    pub async fn handle_at(&self, event: Value, now: DateTime<Utc>) -> IngestResult {
        self.ingest(InboundMessage::from_event(event), now).await
    }

    /// Handle a message straight from transport bytes.
    pub async fn handle_payload(&self, payload: &[u8]) -> IngestResult {
        self.ingest(InboundMessage::from_payload(payload), Utc::now()).await
    }

    #[instrument(name = "ingest", skip_all, fields(device_id = tracing::field::Empty))]
    async fn ingest(&self, inbound: InboundMessage, now: DateTime<Utc>) -> IngestResult {
        HandlerMetrics::record_invocation();

        let message = normalize(inbound.resolve());
        let device_id = message.device_id();
        tracing::Span::current().record("device_id", device_id.as_str());

        let ts = now.timestamp_millis();
        let mut archive_key = new_archive_key(&self.key_prefix, &device_id, now);
        let mut errors = Vec::new();

        // Archive body is serialized before the record takes ownership of the message.
        let body = message.to_json_bytes();

        let record = StorageRecord {
            device_id: device_id.clone(),
            ts,
            data: message,
        };
        let table_written = match self.table.put_reading(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, ts, "readings table write failed");
                errors.push(format!("table: {}", e));
                false
            }
        };
        HandlerMetrics::record_table_write(table_written);

        let archive_written = match body {
            Ok(body) => {
                let len = body.len();
                let put = self.archive.put_object(&archive_key, body, ARCHIVE_CONTENT_TYPE).await;
                match put {
                    Ok(stored_key) => {
                        HandlerMetrics::record_archive_write(true, len);
                        archive_key = stored_key;
                        true
                    }
                    Err(e) => {
                        error!(error = %e, key = %archive_key, "archive write failed");
                        errors.push(format!("archive: {}", e));
                        HandlerMetrics::record_archive_write(false, 0);
                        false
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "archive body serialization failed");
                errors.push(format!("archive: {}", e));
                HandlerMetrics::record_archive_write(false, 0);
                false
            }
        };

        let status = match (table_written, archive_written) {
            (true, true) => IngestStatus::Ok,
            (false, false) => IngestStatus::Failed,
            _ => IngestStatus::Partial,
        };

        info!(
            ts,
            archive_key = %archive_key,
            table_written,
            archive_written,
            "ingested reading"
        );

        IngestResult {
            status,
            table_written,
            archive_written,
            archive_key,
            device_id,
            ts,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::CanonicalValue;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockTable {
        records: Mutex<Vec<StorageRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl ReadingTable for MockTable {
        async fn put_reading(&self, record: &StorageRecord) -> Result<()> {
            if self.fail {
                return Err(PipelineError::Transport("table unavailable".into()));
            }
            self.records.lock().await.push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockArchive {
        objects: Mutex<Vec<(String, Vec<u8>, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ArchiveStore for MockArchive {
        async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
            if self.fail {
                return Err(PipelineError::Transport("archive unavailable".into()));
            }
            self.objects
                .lock()
                .await
                .push((key.to_string(), body, content_type.to_string()));
            Ok(key.to_string())
        }
    }

    fn handler(table: Arc<MockTable>, archive: Arc<MockArchive>) -> IngestionHandler {
        IngestionHandler::new(table, archive)
    }

    #[tokio::test]
    async fn writes_both_sinks() {
        let table = Arc::new(MockTable::default());
        let archive = Arc::new(MockArchive::default());
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();

        let result = handler(table.clone(), archive.clone())
            .handle_at(json!({"device_id": 7, "  ": 1, "temp": 21.5}), now)
            .await;

        assert_eq!(result.status, IngestStatus::Ok);
        assert!(result.table_written && result.archive_written);
        assert_eq!(result.device_id, "7");
        assert_eq!(result.ts, now.timestamp_millis());
        assert!(result
            .archive_key
            .starts_with("airq/year=2024/month=03/day=07/device_id=7/"));

        let records = table.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device_id, "7");
        assert!(records[0].data.get("  ").is_none());
        assert_eq!(
            records[0].data.get("temp").and_then(CanonicalValue::as_decimal).map(|d| d.as_str()),
            Some("21.5")
        );

        let objects = archive.objects.lock().await;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].0, result.archive_key);
        assert_eq!(objects[0].2, "application/json");
        let body: Value = serde_json::from_slice(&objects[0].1).unwrap();
        assert_eq!(body, json!({"device_id": 7, "temp": 21.5}));
    }

    #[tokio::test]
    async fn missing_device_id_is_unknown() {
        let table = Arc::new(MockTable::default());
        let archive = Arc::new(MockArchive::default());

        let result = handler(table.clone(), archive).handle(json!({"temp": 1.0})).await;

        assert_eq!(result.device_id, "unknown");
        assert!(result.archive_key.contains("/device_id=unknown/"));
        assert_eq!(table.records.lock().await[0].device_id, "unknown");
    }

    #[tokio::test]
    async fn table_failure_still_archives() {
        let table = Arc::new(MockTable {
            fail: true,
            ..Default::default()
        });
        let archive = Arc::new(MockArchive::default());

        let result = handler(table, archive.clone())
            .handle(json!({"device_id": "dev1"}))
            .await;

        assert_eq!(result.status, IngestStatus::Partial);
        assert!(!result.table_written);
        assert!(result.archive_written);
        assert!(result.archive_key.contains("/device_id=dev1/"));
        assert_eq!(archive.objects.lock().await.len(), 1);
        assert_eq!(result.errors.len(), 1);

        match result.into_outcome() {
            Err(PipelineError::SinkWrite { status, .. }) => assert_eq!(status, "partial"),
            other => panic!("expected sink write error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn both_failures_are_reported() {
        let table = Arc::new(MockTable {
            fail: true,
            ..Default::default()
        });
        let archive = Arc::new(MockArchive {
            fail: true,
            ..Default::default()
        });

        let result = handler(table, archive).handle(json!({"device_id": "dev1"})).await;

        assert_eq!(result.status, IngestStatus::Failed);
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn same_message_twice_gets_distinct_archive_keys() {
        let table = Arc::new(MockTable::default());
        let archive = Arc::new(MockArchive::default());
        let h = handler(table, archive.clone());
        let now = Utc::now();

        let a = h.handle_at(json!({"device_id": "dev1", "T": 13.6}), now).await;
        let b = h.handle_at(json!({"device_id": "dev1", "T": 13.6}), now).await;

        assert_ne!(a.archive_key, b.archive_key);
        assert_eq!(archive.objects.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn encoded_message_envelope() {
        let table = Arc::new(MockTable::default());
        let archive = Arc::new(MockArchive::default());

        let result = handler(table.clone(), archive)
            .handle(json!({"message": "{\"device_id\": \"dev9\", \"RH\": 48.9}"}))
            .await;
        assert_eq!(result.device_id, "dev9");

        let unparsed = handler(table.clone(), Arc::new(MockArchive::default()))
            .handle(json!({"message": "garbage"}))
            .await;
        assert_eq!(unparsed.device_id, "unknown");
        let records = table.records.lock().await;
        assert_eq!(records[1].data.to_json(), json!({"raw": "garbage"}));
    }

    #[tokio::test]
    async fn payload_bytes_are_handled() {
        let table = Arc::new(MockTable::default());
        let h = handler(table.clone(), Arc::new(MockArchive::default()));

        let result = h.handle_payload(br#"{"device_id":"dev1","CO(GT)":2.6}"#).await;
        assert_eq!(result.status, IngestStatus::Ok);
        assert_eq!(result.device_id, "dev1");

        let result = h.handle_payload(b"\xff not json").await;
        assert_eq!(result.device_id, "unknown");
        let records = table.records.lock().await;
        assert!(records[1].data.get("raw").is_some());
    }

    #[tokio::test]
    async fn payload_decimals_keep_wire_precision() {
        let table = Arc::new(MockTable::default());
        let archive = Arc::new(MockArchive::default());
        let h = handler(table.clone(), archive.clone());

        let result = h
            .handle_payload(br#"{"device_id":"dev1","v":22.950500936812986,"big":18446744073709551615}"#)
            .await;
        assert_eq!(result.status, IngestStatus::Ok);

        let records = table.records.lock().await;
        assert_eq!(
            records[0].data.get("v").and_then(CanonicalValue::as_decimal).map(|d| d.as_str()),
            Some("22.950500936812986")
        );

        let objects = archive.objects.lock().await;
        let body = std::str::from_utf8(&objects[0].1).unwrap();
        assert!(body.contains("22.950500936812986"), "archived as {}", body);
        assert!(body.contains("18446744073709551615"), "archived as {}", body);
    }

    #[test]
    fn result_serializes_with_sink_names() {
        let result = IngestResult {
            status: IngestStatus::Ok,
            table_written: true,
            archive_written: true,
            archive_key: "airq/k.json".into(),
            device_id: "dev1".into(),
            ts: 1,
            errors: vec![],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "ok",
                "ddb_written": true,
                "s3_written": true,
                "s3_key": "airq/k.json",
                "device_id": "dev1",
                "ts": 1
            })
        );
    }
}
