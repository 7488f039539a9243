//! Defaults shared by the producer, the handler and their hosts.
//! Every value here can be overridden through `config.toml`.

// Broker / producer
pub const DEFAULT_BROKER_PORT: u16 = 8883;
pub const DEFAULT_CLIENT_ID: &str = "dev1";
pub const DEFAULT_TOPIC: &str = "sensors/airq/dev1";
pub const DEFAULT_TOPIC_FILTER: &str = "sensors/airq/+";
pub const DEFAULT_CONSUMER_CLIENT_ID: &str = "airq-ingest";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 500;
pub const DEFAULT_PROGRESS_EVERY: usize = 50;
pub const DEFAULT_CSV_PATH: &str = "data/AirQualityUCI.csv";
pub const DEFAULT_CSV_DELIMITER: char = ';';

// Handler
pub const DEFAULT_TABLE_NAME: &str = "AirQReadings";
pub const DEFAULT_TABLE_PATH: &str = "data/readings.db";
pub const DEFAULT_BUCKET: &str = "iot-airq-accountID-eu-central-1";
pub const DEFAULT_ARCHIVE_ROOT: &str = "data/archive";
pub const DEFAULT_KEY_PREFIX: &str = "airq";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/json";

/// Device id used when an inbound message carries none.
pub const UNKNOWN_DEVICE_ID: &str = "unknown";
/// Key under which an unparseable or non-mapping message is preserved.
pub const RAW_MESSAGE_KEY: &str = "raw";

/// "No reading" value emitted by the source instruments.
pub const SENTINEL_VALUE: f64 = -200.0;
pub const SENTINEL_TOLERANCE: f64 = 1e-9;

// Ambient
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "airq.log";
pub const DEFAULT_LOG_DIRECTIVE: &str = "airq_pipeline=info,airq=info";

// Environment overrides
pub const ENV_CONFIG_PATH: &str = "AIRQ_CONFIG";
pub const ENV_TABLE_NAME: &str = "DDB_TABLE";
pub const ENV_BUCKET: &str = "S3_BUCKET";
pub const ENV_METRICS_PORT: &str = "AIRQ_METRICS_PORT";
