use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ENVIRONMENT: &str = "prod";
pub const TEST_ENVIRONMENT: &str = "test";
pub const DEFAULT_USER_AGENT: &str = concat!("gastos-relay/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_OVERALL_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Environment tag cannot be empty")]
    EmptyEnvironment,

    #[error("User agent cannot be empty")]
    EmptyUserAgent,

    #[error("Webhook URL must use http or https: {0}")]
    UnsupportedScheme(Url),

    #[error("Timeouts must be greater than zero")]
    ZeroTimeout,

    #[error("Connect timeout ({connect_secs}s) exceeds overall timeout ({overall_secs}s)")]
    ConnectExceedsOverall { connect_secs: u64, overall_secs: u64 },
}

/// Deadlines applied to every webhook call.
///
/// The connect deadline is shorter than the overall one: a sleeping webhook
/// host is slow to accept a connection but answers quickly once awake, while a
/// dead host never accepts at all.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Timeouts {
    #[serde(default = "default_overall_secs")]
    pub overall_secs: u64,
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
}

fn default_overall_secs() -> u64 {
    DEFAULT_OVERALL_TIMEOUT_SECS
}

fn default_connect_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            overall_secs: DEFAULT_OVERALL_TIMEOUT_SECS,
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    pub fn overall(&self) -> Duration {
        Duration::from_secs(self.overall_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.overall_secs == 0 || self.connect_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        if self.connect_secs > self.overall_secs {
            return Err(ValidationError::ConnectExceedsOverall {
                connect_secs: self.connect_secs,
                overall_secs: self.overall_secs,
            });
        }
        Ok(())
    }
}

/// Webhook URLs of the receiving workflow, one per workflow mode.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WebhookTargets {
    pub test: Option<Url>,
    pub prod: Option<Url>,
}

/// Forwarder section of the service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Deployment tag copied into every payload as `environment`.
    /// `test` selects the test webhook, anything else the production one.
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub webhooks: WebhookTargets,
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: default_environment(),
            user_agent: default_user_agent(),
            webhooks: WebhookTargets::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.environment.is_empty() {
            return Err(ValidationError::EmptyEnvironment);
        }
        if self.user_agent.is_empty() {
            return Err(ValidationError::EmptyUserAgent);
        }

        for url in [&self.webhooks.test, &self.webhooks.prod].into_iter().flatten() {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ValidationError::UnsupportedScheme(url.clone()));
            }
        }

        self.timeouts.validate()
    }

    pub fn is_test(&self) -> bool {
        self.environment == TEST_ENVIRONMENT
    }

    /// The webhook URL matching the configured environment, if one is set.
    pub fn selected_webhook(&self) -> Option<&Url> {
        if self.is_test() {
            self.webhooks.test.as_ref()
        } else {
            self.webhooks.prod.as_ref()
        }
    }

    /// Resolves the runtime forwarder configuration.
    ///
    /// Returns `None` when no webhook is configured for the environment.
    pub fn forwarder_config(&self) -> Option<ForwarderConfig> {
        self.selected_webhook().map(|url| ForwarderConfig {
            webhook_url: url.clone(),
            environment: self.environment.clone(),
            user_agent: self.user_agent.clone(),
            timeouts: self.timeouts.clone(),
        })
    }
}

/// Immutable configuration of a single [`crate::WebhookForwarder`].
#[derive(Clone, Debug, PartialEq)]
pub struct ForwarderConfig {
    pub webhook_url: Url,
    pub environment: String,
    pub user_agent: String,
    pub timeouts: Timeouts,
}

impl ForwarderConfig {
    pub fn new(webhook_url: Url, environment: impl Into<String>) -> Self {
        ForwarderConfig {
            webhook_url,
            environment: environment.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
