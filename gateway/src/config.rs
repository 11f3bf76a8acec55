use http::HeaderValue;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente experto en análisis de gastos, \
tendencias financieras y contexto económico. Responde en español claro y concreto.";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("API bearer token is not configured")]
    MissingBearerToken,

    #[error("Completion API key is not configured")]
    MissingApiKey,

    #[error("Completion model cannot be empty")]
    EmptyModel,

    #[error("max_tokens must be greater than zero")]
    InvalidMaxTokens,

    #[error("temperature must be between 0 and 2, got {0}")]
    InvalidTemperature(f32),

    #[error("Completion timeouts must be greater than zero")]
    ZeroTimeout,

    #[error("Completion connect timeout ({connect_secs}s) exceeds request timeout ({timeout_secs}s)")]
    ConnectExceedsTimeout { connect_secs: u64, timeout_secs: u64 },

    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// OpenAI-compatible chat completion endpoint
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CompletionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Usually supplied through `GROQ_API_KEY` rather than the file.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Deadline for the whole completion call, including reading the answer.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_COMPLETION_BASE_URL).expect("default completion URL is valid")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f32 {
    0.4
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingApiKey);
        }
        if self.model.is_empty() {
            return Err(ValidationError::EmptyModel);
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::InvalidMaxTokens);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidTemperature(self.temperature));
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.connect_timeout_secs > self.timeout_secs {
            return Err(ValidationError::ConnectExceedsTimeout {
                connect_secs: self.connect_timeout_secs,
                timeout_secs: self.timeout_secs,
            });
        }
        Ok(())
    }
}

/// Gateway API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// Token clients must present as `Authorization: Bearer <token>`.
    /// Usually supplied through `API_BEARER_TOKEN`.
    #[serde(default)]
    pub api_bearer_token: String,
    /// `*` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub completion: CompletionConfig,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            api_bearer_token: String::new(),
            allowed_origins: default_allowed_origins(),
            completion: CompletionConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if self.api_bearer_token.is_empty() {
            return Err(ValidationError::MissingBearerToken);
        }

        for origin in &self.allowed_origins {
            if origin != "*" && HeaderValue::from_str(origin).is_err() {
                return Err(ValidationError::InvalidOrigin(origin.clone()));
            }
        }

        self.completion.validate()
    }
}

pub(crate) fn allows_any_origin(origins: &[String]) -> bool {
    origins.is_empty() || origins.iter().any(|origin| origin == "*")
}
