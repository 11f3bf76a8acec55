use reqwest::Response;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, DATE, HeaderName, SERVER};
use serde::Serialize;
use std::time::Duration;

/// Response headers copied into the outcome and the delivery log.
static SELECTED_RESPONSE_HEADERS: &[HeaderName] = &[CONTENT_TYPE, CONTENT_LENGTH, DATE, SERVER];

/// What the webhook answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl DeliveryResponse {
    pub(crate) async fn read(response: Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = SELECTED_RESPONSE_HEADERS
            .iter()
            .filter_map(|name| {
                response.headers().get(name).map(|value| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
            })
            .collect();
        let body = response.text().await?;

        Ok(DeliveryResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeKind {
    Delivered,
    Timeout,
    ConnectionFailure,
    Unclassified,
}

impl OutcomeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Delivered => "delivered",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::ConnectionFailure => "connection_failure",
            OutcomeKind::Unclassified => "unclassified",
        }
    }
}

/// Result of one webhook delivery attempt.
///
/// Any response counts as `Delivered`, whatever its status code; use
/// [`DeliveryOutcome::is_success`] to tell 2xx apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        response: DeliveryResponse,
        elapsed: Duration,
    },
    /// No response within the overall deadline.
    Timeout { elapsed: Duration, deadline: Duration },
    /// No transport connection could be established. `timed_out` is set when
    /// the connect deadline expired rather than the peer refusing.
    ConnectionFailure {
        elapsed: Duration,
        error: String,
        timed_out: bool,
    },
    Unclassified { elapsed: Duration, error: String },
}

impl DeliveryOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            DeliveryOutcome::Delivered { .. } => OutcomeKind::Delivered,
            DeliveryOutcome::Timeout { .. } => OutcomeKind::Timeout,
            DeliveryOutcome::ConnectionFailure { .. } => OutcomeKind::ConnectionFailure,
            DeliveryOutcome::Unclassified { .. } => OutcomeKind::Unclassified,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            DeliveryOutcome::Delivered { elapsed, .. }
            | DeliveryOutcome::Timeout { elapsed, .. }
            | DeliveryOutcome::ConnectionFailure { elapsed, .. }
            | DeliveryOutcome::Unclassified { elapsed, .. } => *elapsed,
        }
    }

    pub fn response(&self) -> Option<&DeliveryResponse> {
        match self {
            DeliveryOutcome::Delivered { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }

    pub fn is_delivered(&self) -> bool {
        self.kind() == OutcomeKind::Delivered
    }

    /// Delivered with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status().is_some_and(|status| (200..300).contains(&status))
    }

    pub fn error(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::Timeout { deadline, .. } => {
                Some(format!("no response within {}s", deadline.as_secs_f64()))
            }
            DeliveryOutcome::ConnectionFailure { error, .. }
            | DeliveryOutcome::Unclassified { error, .. } => Some(error.clone()),
        }
    }

    /// Elapsed wall time in whole milliseconds, saturating at `u64::MAX`.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            outcome: self.kind().as_str(),
            status: self.status(),
            elapsed_ms: self.elapsed_ms(),
            error: self.error(),
        }
    }
}

/// Serializable digest of an outcome, for informational API responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
