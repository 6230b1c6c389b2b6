//! Logging and metrics exporter setup shared by the worker binaries

use crate::config::ObservabilityConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{JOB_BUCKETS, SEARCH_BUCKETS};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus exporter on `metrics_port`; port 0 disables it.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    if config.metrics_port == 0 {
        tracing::info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let to_config_error = |e: metrics_exporter_prometheus::BuildError| AppError::Configuration {
        message: format!("Failed to build metrics exporter: {}", e),
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Suffix("search_duration_seconds".to_string()),
            SEARCH_BUCKETS,
        )
        .map_err(to_config_error)?
        .set_buckets_for_metric(
            Matcher::Suffix("job_duration_seconds".to_string()),
            JOB_BUCKETS,
        )
        .map_err(to_config_error)?
        .install()
        .map_err(to_config_error)?;

    crate::metrics::register_metrics();
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}
