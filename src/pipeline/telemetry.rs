use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::pipeline::sanitize::sanitize;
use crate::pipeline::source::SourceRecord;

/// One wire message published by the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    fields: Map<String, Value>,
}

impl TelemetryRecord {
    /// Stamp a source row with the device id and the production time, then add
    /// every column sanitized under its original name.
    pub fn build(device_id: &str, produced_at: DateTime<Utc>, row: &SourceRecord) -> Self {
        let mut fields = Map::new();
        fields.insert("device_id".into(), Value::from(device_id));
        fields.insert("date".into(), Value::from(produced_at.format("%Y-%m-%d").to_string()));
        fields.insert("time".into(), Value::from(produced_at.format("%H:%M:%S").to_string()));
        fields.insert(
            "timestamp".into(),
            Value::from(produced_at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
        );

        for (column, raw) in row.fields() {
            let value = sanitize(raw)
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            fields.insert(column.to_string(), value);
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_payload(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn stamps_and_sanitizes_row() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        let row = SourceRecord::from_pairs([("CO(GT)", Some("2,6")), ("NMHC(GT)", Some("-200")), ("Date", Some("10/03/2004"))]);

        let record = TelemetryRecord::build("dev1", at, &row);

        assert_eq!(record.get("device_id"), Some(&json!("dev1")));
        assert_eq!(record.get("date"), Some(&json!("2024-05-01")));
        assert_eq!(record.get("time"), Some(&json!("09:30:05")));
        assert_eq!(record.get("timestamp"), Some(&json!("2024-05-01T09:30:05.000000Z")));
        assert_eq!(record.get("CO(GT)"), Some(&json!(2.6)));
        assert_eq!(record.get("NMHC(GT)"), Some(&Value::Null));
        assert_eq!(record.get("Date"), Some(&Value::Null));
    }

    #[test]
    fn payload_is_json_object() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        let row = SourceRecord::from_pairs([("T", Some("13,6"))]);
        let payload = TelemetryRecord::build("dev1", at, &row).to_payload().unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["T"], json!(13.6));
    }
}
