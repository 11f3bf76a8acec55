use forwarder::config::Config as ForwarderConfig;
use gateway::config::Config as GatewayConfig;
use serde::Deserialize;
use std::fs::File;
use url::Url;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

fn default_metrics_prefix() -> String {
    "relay".to_string()
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Emit one JSON object per log line instead of the human format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Loads the file, then applies overrides from the process environment.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(shared::env::var)?;
        Ok(config)
    }

    /// Overrides file values with deployment variables.
    ///
    /// `lookup` must return cleaned values and `None` for unset or empty ones.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.gateway.completion.api_key = key;
        }
        if let Some(token) = lookup("API_BEARER_TOKEN") {
            self.gateway.api_bearer_token = token;
        }
        if let Some(model) = lookup("MODEL_NAME") {
            self.gateway.completion.model = model;
        }
        if let Some(base_url) = lookup("BASE_URL") {
            self.gateway.completion.base_url = parse_url("BASE_URL", &base_url)?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.gateway.allowed_origins = origins
                .split(',')
                .filter_map(shared::env::non_empty)
                .collect();
        }
        if let Some(port) = lookup("PORT") {
            self.gateway.listener.port =
                port.parse().map_err(|_| ConfigError::InvalidOverride {
                    name: "PORT",
                    value: port.clone(),
                })?;
        }

        if let Some(environment) = lookup("ENVIRONMENT") {
            self.forwarder.environment = environment;
        }
        if let Some(url) = lookup("N8N_WEBHOOK_TEST") {
            self.forwarder.webhooks.test = Some(parse_url("N8N_WEBHOOK_TEST", &url)?);
        }
        if let Some(url) = lookup("N8N_WEBHOOK_PROD") {
            self.forwarder.webhooks.prod = Some(parse_url("N8N_WEBHOOK_PROD", &url)?);
        }
        Ok(())
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|_| ConfigError::InvalidOverride {
        name,
        value: value.to_string(),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value:?}")]
    InvalidOverride { name: &'static str, value: String },
    #[error("invalid gateway config: {0}")]
    Gateway(#[from] gateway::config::ValidationError),
    #[error("invalid forwarder config: {0}")]
    Forwarder(#[from] forwarder::config::ValidationError),
}
