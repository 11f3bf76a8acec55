use crate::config::ConfigError;
use forwarder::payload::NotAnObject;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("gateway error: {0}")]
    Gateway(#[from] gateway::GatewayError),

    #[error("forwarder error: {0}")]
    Forwarder(#[from] forwarder::ForwarderError),

    #[error("completion client error: {0}")]
    Completion(#[from] gateway::completion::CompletionError),

    #[error("no webhook configured for environment {0:?}")]
    NoWebhook(String),

    #[error("invalid --data JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid --data: {0}")]
    InvalidPayload(#[from] NotAnObject),

    #[error("statsd exporter error: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),

    #[error("could not install metrics recorder: {0}")]
    MetricsInstall(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
