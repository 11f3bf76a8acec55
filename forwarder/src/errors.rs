use reqwest::header::InvalidHeaderValue;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for forwarder operations
pub type Result<T, E = ForwarderError> = std::result::Result<T, E>;

/// Errors raised while preparing or performing a webhook call.
///
/// These never leave [`crate::WebhookForwarder::send`]; they are classified
/// into a [`crate::DeliveryOutcome`] at that boundary.
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Invalid value for header {name}: {source}")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Renders an error together with its whole source chain.
///
/// reqwest keeps the interesting part (`Connection refused`, `dns error`)
/// several levels down the chain.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_str = cause.to_string();
        if !rendered.contains(&cause_str) {
            rendered.push_str(": ");
            rendered.push_str(&cause_str);
        }
        source = cause.source();
    }
    rendered
}
