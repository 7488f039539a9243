use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::app::ports::{ReadingTable, StorageRecord};
use crate::error::{PipelineError, Result};
use crate::pipeline::normalize::{CanonicalMessage, CanonicalValue, ExactDecimal};

/// Readings table on SQLite, keyed by `(device_id, ts)`.
///
/// `data` is stored as typed attributes (`{"N": "21.5"}`, `{"S": "dev1"}`, ...)
/// so decimals keep their exact text.
pub struct SqliteReadingTable {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteReadingTable {
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        // the name is interpolated into SQL
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PipelineError::Config(format!("Invalid table name '{}'", table)));
        }
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS {table} (
                device_id  TEXT    NOT NULL,
                ts         INTEGER NOT NULL,
                data       TEXT    NOT NULL,
                PRIMARY KEY (device_id, ts)
            );
            "#
        ))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    /// Point lookup by primary key.
    pub fn get_reading(&self, device_id: &str, ts: i64) -> Result<Option<StorageRecord>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE device_id = ?1 AND ts = ?2", self.table),
                params![device_id, ts],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            None => Ok(None),
            Some(text) => {
                let attributes: Map<String, Value> = serde_json::from_str(&text)?;
                let fields = attributes
                    .into_iter()
                    .map(|(k, v)| from_attribute(v).map(|value| (k, value)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(Some(StorageRecord {
                    device_id: device_id.to_string(),
                    ts,
                    data: CanonicalMessage::from_fields(fields),
                }))
            }
        }
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| PipelineError::Config("readings table lock poisoned".to_string()))
}

#[async_trait]
impl ReadingTable for SqliteReadingTable {
    async fn put_reading(&self, record: &StorageRecord) -> Result<()> {
        let attributes: Map<String, Value> = record
            .data
            .fields()
            .iter()
            .map(|(k, v)| (k.clone(), to_attribute(v)))
            .collect();
        let data = serde_json::to_string(&attributes)?;

        let sql = format!(
            "INSERT INTO {} (device_id, ts, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(device_id, ts) DO UPDATE SET data=excluded.data",
            self.table
        );
        let conn = Arc::clone(&self.conn);
        let device_id = record.device_id.clone();
        let ts = record.ts;

        // rusqlite blocks; keep it off the runtime threads
        tokio::task::spawn_blocking(move || -> Result<()> {
            lock_connection(&conn)?.execute(&sql, params![device_id, ts, data])?;
            Ok(())
        })
        .await??;

        debug!(device_id = %record.device_id, ts = record.ts, "upserted reading");
        Ok(())
    }
}

fn to_attribute(value: &CanonicalValue) -> Value {
    match value {
        CanonicalValue::Null => json!({ "NULL": true }),
        CanonicalValue::Bool(b) => json!({ "BOOL": b }),
        CanonicalValue::Integer(i) => json!({ "N": i.to_string() }),
        CanonicalValue::Unsigned(u) => json!({ "N": u.to_string() }),
        CanonicalValue::Decimal(d) => json!({ "N": d.as_str() }),
        CanonicalValue::String(s) => json!({ "S": s }),
        CanonicalValue::List(items) => json!({ "L": items.iter().map(to_attribute).collect::<Vec<_>>() }),
        CanonicalValue::Map(entries) => {
            let m: Map<String, Value> = entries.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect();
            json!({ "M": m })
        }
    }
}

fn from_attribute(value: Value) -> Result<CanonicalValue> {
    let bad = || PipelineError::Config("malformed attribute in readings table".to_string());

    let Value::Object(map) = value else {
        return Err(bad());
    };
    let (tag, inner) = map.into_iter().next().ok_or_else(bad)?;

    match (tag.as_str(), inner) {
        ("NULL", _) => Ok(CanonicalValue::Null),
        ("BOOL", Value::Bool(b)) => Ok(CanonicalValue::Bool(b)),
        ("S", Value::String(s)) => Ok(CanonicalValue::String(s)),
        ("N", Value::String(text)) => {
            if let Ok(i) = text.parse::<i64>() {
                Ok(CanonicalValue::Integer(i))
            } else if let Ok(u) = text.parse::<u64>() {
                Ok(CanonicalValue::Unsigned(u))
            } else {
                ExactDecimal::parse(&text).map(CanonicalValue::Decimal).ok_or_else(bad)
            }
        }
        ("L", Value::Array(items)) => Ok(CanonicalValue::List(
            items.into_iter().map(from_attribute).collect::<Result<_>>()?,
        )),
        ("M", Value::Object(entries)) => Ok(CanonicalValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| from_attribute(v).map(|value| (k, value)))
                .collect::<Result<_>>()?,
        )),
        _ => Err(bad()),
    }
}
