use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::app::publish_use_case::ProducerSettings;
use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::infra::mqtt_transport::{MqttSettings, TlsFiles};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub handler: HandlerConfig,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    /// Plain TCP when false; only meant for a local broker.
    pub tls: bool,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost".to_string(),
            port: DEFAULT_BROKER_PORT,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            tls: true,
            cert_path: PathBuf::from("certs/device.pem.crt"),
            key_path: PathBuf::from("certs/private.pem.key"),
            ca_path: PathBuf::from("certs/AmazonRootCA1.pem"),
        }
    }
}

impl BrokerConfig {
    pub fn mqtt_settings(&self, client_id: &str) -> MqttSettings {
        MqttSettings {
            host: self.endpoint.clone(),
            port: self.port,
            client_id: client_id.to_string(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            tls: self.tls.then(|| TlsFiles {
                ca_path: self.ca_path.clone(),
                cert_path: self.cert_path.clone(),
                key_path: self.key_path.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub client_id: String,
    pub topic: String,
    pub csv_path: PathBuf,
    pub delimiter: char,
    pub interval_ms: u64,
    /// `0` means no cap, the same as leaving it unset.
    pub max_rows: Option<usize>,
    pub progress_every: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            delimiter: DEFAULT_CSV_DELIMITER,
            interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            max_rows: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl ProducerConfig {
    pub fn settings(&self) -> ProducerSettings {
        ProducerSettings {
            device_id: self.client_id.clone(),
            topic: self.topic.clone(),
            interval: Duration::from_millis(self.interval_ms),
            max_count: self.max_rows.filter(|&max| max > 0),
            progress_every: self.progress_every,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub client_id: String,
    pub topic_filter: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CONSUMER_CLIENT_ID.to_string(),
            topic_filter: DEFAULT_TOPIC_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub table_name: String,
    pub table_path: PathBuf,
    pub archive_backend: ArchiveBackend,
    pub bucket: String,
    pub archive_root: PathBuf,
    pub key_prefix: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
            archive_backend: ArchiveBackend::Local,
            bucket: DEFAULT_BUCKET.to_string(),
            archive_root: PathBuf::from(DEFAULT_ARCHIVE_ROOT),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `AIRQ_CONFIG` or
    /// `config.toml` is read when present, otherwise defaults apply.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = std::env::var(ENV_CONFIG_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table) = var(ENV_TABLE_NAME) {
            self.handler.table_name = table;
        }
        if let Some(bucket) = var(ENV_BUCKET) {
            self.handler.bucket = bucket;
        }
        if let Some(port) = var(ENV_METRICS_PORT) {
            let port = port
                .parse()
                .map_err(|_| PipelineError::Config(format!("{} is not a port: '{}'", ENV_METRICS_PORT, port)))?;
            self.metrics_port = Some(port);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_deployment() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.producer.topic, "sensors/airq/dev1");
        assert_eq!(config.producer.client_id, "dev1");
        assert_eq!(config.producer.delimiter, ';');
        assert_eq!(config.producer.interval_ms, 500);
        assert_eq!(config.producer.max_rows, None);
        assert_eq!(config.handler.table_name, "AirQReadings");
        assert_eq!(config.handler.key_prefix, "airq");
        assert_eq!(config.broker.port, 8883);
        assert!(config.broker.tls);
    }

    #[test]
    fn partial_file_overrides() {
        let config = Config::from_toml(
            r#"
            metrics_port = 9898

            [broker]
            endpoint = "example-ats.iot.eu-central-1.amazonaws.com"

            [producer]
            max_rows = 100
            interval_ms = 0

            [handler]
            archive_backend = "s3"
            bucket = "my-bucket"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.endpoint, "example-ats.iot.eu-central-1.amazonaws.com");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.producer.max_rows, Some(100));
        assert_eq!(config.handler.archive_backend, ArchiveBackend::S3);
        assert_eq!(config.handler.bucket, "my-bucket");
        assert_eq!(config.metrics_port, Some(9898));

        let settings = config.producer.settings();
        assert!(settings.interval.is_zero());
        assert_eq!(settings.max_count, Some(100));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [("DDB_TABLE", "Readings2"), ("S3_BUCKET", "archive-b")].into();
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.handler.table_name, "Readings2");
        assert_eq!(config.handler.bucket, "archive-b");

        let mut config = Config::default();
        assert!(config
            .apply_env(|k| (k == "AIRQ_METRICS_PORT").then(|| "nope".to_string()))
            .is_err());
    }

    #[test]
    fn zero_max_rows_means_no_cap() {
        let config = Config::from_toml("[producer]\nmax_rows = 0\n").unwrap();
        assert_eq!(config.producer.max_rows, Some(0));
        assert_eq!(config.producer.settings().max_count, None);
    }

    #[test]
    fn broker_settings_without_tls() {
        let broker = BrokerConfig {
            tls: false,
            ..Default::default()
        };
        let settings = broker.mqtt_settings("dev1");
        assert!(settings.tls.is_none());
        assert_eq!(settings.keep_alive, Duration::from_secs(30));
    }
}
