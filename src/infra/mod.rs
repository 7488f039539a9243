pub mod in_memory;
pub mod mqtt_subscriber;
pub mod mqtt_transport;
pub mod object_archive;
pub mod sqlite_table;

use std::sync::Arc;

use tracing::info;

use crate::app::ingest_use_case::IngestionHandler;
use crate::app::ports::{ArchiveStore, ReadingTable};
use crate::config::{ArchiveBackend, HandlerConfig};
use crate::error::Result;
use object_archive::ObjectArchive;
use sqlite_table::SqliteReadingTable;

/// Build the long-lived sink clients once and hand them to a handler.
pub fn build_handler(config: &HandlerConfig) -> Result<IngestionHandler> {
    let table: Arc<dyn ReadingTable> =
        Arc::new(SqliteReadingTable::open(&config.table_path, &config.table_name)?);

    let archive: Arc<dyn ArchiveStore> = Arc::new(match config.archive_backend {
        ArchiveBackend::S3 => ObjectArchive::s3(&config.bucket)?,
        ArchiveBackend::Local => ObjectArchive::local(&config.archive_root)?,
        ArchiveBackend::Memory => ObjectArchive::in_memory(),
    });

    info!(
        table = %config.table_name,
        table_path = %config.table_path.display(),
        backend = ?config.archive_backend,
        "ingestion sinks ready"
    );

    Ok(IngestionHandler::new(table, archive).with_key_prefix(config.key_prefix.clone()))
}
