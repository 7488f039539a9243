pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;

// Domain rules: normalization, sanitization, keys, source feed
pub mod pipeline;

// Use cases and the ports they depend on
pub mod app;

// Adapters for the table, the archive and the MQTT broker
pub mod infra;

pub use app::ingest_use_case::{IngestResult, IngestStatus, IngestionHandler};
pub use app::publish_use_case::{ProducerSettings, ProducerState, TelemetryProducer};
pub use error::{PipelineError, Result};
