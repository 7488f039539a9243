use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::{ReadingTable, StorageRecord};
use crate::error::{PipelineError, Result};

/// In-memory readings table for development/testing.
#[derive(Clone, Default)]
pub struct InMemoryReadingTable {
    records: Arc<Mutex<BTreeMap<(String, i64), StorageRecord>>>,
}

impl InMemoryReadingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str, ts: i64) -> Option<StorageRecord> {
        self.records
            .lock()
            .ok()?
            .get(&(device_id.to_string(), ts))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingTable for InMemoryReadingTable {
    async fn put_reading(&self, record: &StorageRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PipelineError::Config("readings table lock poisoned".to_string()))?;
        records.insert((record.device_id.clone(), record.ts), record.clone());

        debug!("Stored reading for {} at {}", record.device_id, record.ts);
        Ok(())
    }
}
