//! Pipeline counters.
//!
//! Recorded through the `metrics` facade; nothing is exported unless
//! [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;

use tracing::{info, warn};

pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!(%addr, "Prometheus exporter listening"),
        Err(e) => warn!(error = %e, "Prometheus exporter install failed (possibly already installed)"),
    }
}

/// Ingestion handler counters
pub struct HandlerMetrics;

impl HandlerMetrics {
    pub fn record_invocation() {
        ::metrics::counter!("airq_handler_invocations_total").increment(1);
    }

    pub fn record_table_write(success: bool) {
        if success {
            ::metrics::counter!("airq_handler_table_writes_success").increment(1);
        } else {
            ::metrics::counter!("airq_handler_table_writes_error").increment(1);
        }
    }

    pub fn record_archive_write(success: bool, body_bytes: usize) {
        if success {
            ::metrics::counter!("airq_handler_archive_writes_success").increment(1);
            ::metrics::histogram!("airq_handler_archive_body_bytes").record(body_bytes as f64);
        } else {
            ::metrics::counter!("airq_handler_archive_writes_error").increment(1);
        }
    }
}

/// Telemetry producer counters
pub struct ProducerMetrics;

impl ProducerMetrics {
    pub fn record_published(payload_bytes: usize) {
        ::metrics::counter!("airq_producer_published_total").increment(1);
        ::metrics::histogram!("airq_producer_payload_bytes").record(payload_bytes as f64);
    }

    pub fn record_publish_error() {
        ::metrics::counter!("airq_producer_publish_errors_total").increment(1);
    }
}
