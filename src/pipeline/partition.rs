use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Archive object key for one ingested message.
///
/// Pattern: `<prefix>/year=YYYY/month=MM/day=DD/device_id=<id>/<suffix>.json`
pub fn archive_key(prefix: &str, device_id: &str, ingested_at: DateTime<Utc>, suffix: Uuid) -> String {
    format!(
        "{}/year={}/month={}/day={}/device_id={}/{}.json",
        prefix.trim_end_matches('/'),
        ingested_at.format("%Y"),
        ingested_at.format("%m"),
        ingested_at.format("%d"),
        device_id,
        suffix
    )
}

/// Same as [`archive_key`] with a fresh random suffix.
pub fn new_archive_key(prefix: &str, device_id: &str, ingested_at: DateTime<Utc>) -> String {
    archive_key(prefix, device_id, ingested_at, Uuid::new_v4())
}
