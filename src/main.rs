use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use airq_pipeline::config::Config;
use airq_pipeline::infra::{self, mqtt_subscriber, mqtt_transport::MqttTransport};
use airq_pipeline::pipeline::source::CsvSource;
use airq_pipeline::{logging, metrics, IngestStatus, PipelineError, TelemetryProducer};

#[derive(Parser)]
#[command(name = "airq")]
#[command(about = "Air-quality telemetry producer and ingestion pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to config.toml (defaults to $AIRQ_CONFIG, then ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a CSV dataset as device telemetry over MQTT
    Publish {
        /// Source CSV (overrides producer.csv_path)
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Stop after this many records (0 for no cap)
        #[arg(long)]
        max_rows: Option<usize>,
        /// Pause between publishes in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Run the ingestion handler once on an event read from a file or stdin
    Handle {
        /// Event JSON file; reads stdin when omitted
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Subscribe to the telemetry topic and ingest every message
    Consume {
        /// Topic filter (overrides consumer.topic_filter)
        #[arg(long)]
        topic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port);
    }

    match cli.command {
        Commands::Publish {
            csv,
            max_rows,
            interval_ms,
        } => {
            let mut producer_config = config.producer.clone();
            if let Some(path) = csv {
                producer_config.csv_path = path;
            }
            if max_rows.is_some() {
                producer_config.max_rows = max_rows;
            }
            if let Some(ms) = interval_ms {
                producer_config.interval_ms = ms;
            }

            let source = CsvSource::open(&producer_config.csv_path, producer_config.delimiter)?;
            let transport = MqttTransport::new(config.broker.mqtt_settings(&producer_config.client_id));
            let mut producer = TelemetryProducer::new(transport, producer_config.settings());

            info!(csv = %producer_config.csv_path.display(), "🚀 Starting telemetry replay");
            match producer.run(source).await {
                Ok(sent) => println!("✅ Total sent: {}", sent),
                Err(e) => {
                    if let PipelineError::StreamAborted { sent, .. } = &e {
                        error!(sent = *sent, "telemetry replay failed");
                        println!("❌ Replay failed, total sent: {}", sent);
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Handle { event } => {
            let raw = match event {
                Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let handler = infra::build_handler(&config.handler)?;
            let result = handler.handle_payload(&raw).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if result.status != IngestStatus::Ok {
                warn!(status = result.status.as_str(), "invocation did not write every sink");
                result.into_outcome()?;
            }
        }
        Commands::Consume { topic } => {
            let topic = topic.unwrap_or_else(|| config.consumer.topic_filter.clone());
            let handler = infra::build_handler(&config.handler)?;
            let settings = config.broker.mqtt_settings(&config.consumer.client_id);

            let handled = mqtt_subscriber::run_subscriber(&settings, &topic, &handler).await?;
            println!("📥 Handled {} messages", handled);
        }
    }

    Ok(())
}
