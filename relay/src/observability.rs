//! Logging and metrics bootstrap for the binary.

use crate::config::{LoggingConfig, MetricsConfig};
use crate::errors::RelayError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global tracing subscriber.
///
/// The returned guard flushes Sentry on drop and must outlive the program.
pub fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = if config.is_some_and(|c| c.json) {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let guard = config
        .and_then(|c| c.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(sentry_layer)
        .init();

    guard
}

/// Installs the statsd exporter as the global metrics recorder.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), RelayError> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        config.statsd_host.clone(),
        config.statsd_port,
    )
    .build(Some(&config.prefix))?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| RelayError::MetricsInstall(e.to_string()))?;
    shared::metrics_defs::describe_all(forwarder::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        prefix = %config.prefix,
        "Metrics exporter installed"
    );
    Ok(())
}
