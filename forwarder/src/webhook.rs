use crate::config::ForwarderConfig;
use crate::errors::{ForwarderError, Result, error_chain};
use crate::metrics_defs::{WEBHOOK_DELIVERIES, WEBHOOK_DELIVERY_DURATION};
use crate::outcome::{DeliveryOutcome, DeliveryResponse};
use crate::payload::Payload;
use crate::repro::curl_command;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

/// Sends relay events to the configured webhook.
///
/// Cheap to clone; clones share the HTTP connection pool and configuration.
#[derive(Clone)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    config: Arc<ForwarderConfig>,
}

/// A fully prepared webhook call. Kept around so the same URL, headers and
/// body end up in the logs and in the curl reproduction.
struct OutgoingRequest {
    url: Url,
    headers: HeaderMap,
    body: String,
}

impl OutgoingRequest {
    fn prepare(config: &ForwarderConfig, payload: &Payload) -> Result<Self> {
        let mut headers = base_headers();
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|source| {
            ForwarderError::InvalidHeader {
                name: "user-agent",
                source,
            }
        })?;
        headers.insert(USER_AGENT, user_agent);

        Ok(OutgoingRequest {
            url: config.webhook_url.clone(),
            headers,
            body: serde_json::to_string(payload)?,
        })
    }

    /// The request as far as it can be built when `prepare` failed, so the
    /// failure log still carries a body and a curl command.
    fn partial(config: &ForwarderConfig, payload: &Payload) -> Self {
        OutgoingRequest {
            url: config.webhook_url.clone(),
            headers: base_headers(),
            body: serde_json::to_string(payload).unwrap_or_else(|_| format!("{payload:?}")),
        }
    }

    fn curl(&self) -> String {
        curl_command(&self.url, &self.headers, &self.body)
    }
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

impl WebhookForwarder {
    pub fn new(config: ForwarderConfig) -> Result<Self> {
        // The overall deadline is enforced around each call in `post`; the
        // client only carries the connect deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .no_proxy()
            .build()
            .map_err(ForwarderError::ClientBuild)?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn webhook_url(&self) -> &Url {
        &self.config.webhook_url
    }

    /// Delivers `data` to the webhook, tagged with the originating route.
    ///
    /// `data` is only read; `origin_endpoint` and `environment` are added to
    /// a copy. Never fails: transport problems are reported through the
    /// returned outcome and the logs, so callers can ignore the result.
    pub async fn send(&self, data: &Payload, origin: &str) -> DeliveryOutcome {
        let start = Instant::now();
        let payload = data.derive(origin, &self.config.environment);

        let request = match OutgoingRequest::prepare(&self.config, &payload) {
            Ok(request) => request,
            Err(e) => {
                let outcome = DeliveryOutcome::Unclassified {
                    elapsed: start.elapsed(),
                    error: error_chain(&e),
                };
                let partial = OutgoingRequest::partial(&self.config, &payload);
                tracing::error!(
                    url = %partial.url,
                    origin,
                    request_headers = ?partial.headers,
                    request_body = %partial.body,
                    elapsed_ms = outcome.elapsed_ms(),
                    error = %error_chain(&e),
                    curl = %partial.curl(),
                    "Could not prepare webhook request"
                );
                record_metrics(&outcome);
                return outcome;
            }
        };

        let result = self.post(&request).await;
        let outcome = classify(result, start.elapsed());
        log_outcome(&request, origin, &outcome);
        record_metrics(&outcome);
        outcome
    }

    async fn post(&self, request: &OutgoingRequest) -> Result<DeliveryResponse> {
        let deadline = self.config.timeouts.overall();

        timeout(deadline, self.exchange(request))
            .await
            // Outer error: the overall deadline elapsed before the body was read
            .map_err(|_| ForwarderError::Timeout(deadline))?
    }

    async fn exchange(&self, request: &OutgoingRequest) -> Result<DeliveryResponse> {
        let response = self
            .client
            .post(request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await?;

        Ok(DeliveryResponse::read(response).await?)
    }
}

fn classify(result: Result<DeliveryResponse>, elapsed: Duration) -> DeliveryOutcome {
    match result {
        Ok(response) => DeliveryOutcome::Delivered { response, elapsed },
        Err(ForwarderError::Timeout(deadline)) => DeliveryOutcome::Timeout { elapsed, deadline },
        // Checked before `is_timeout`: an expired connect deadline is a
        // connection failure, not a slow response.
        Err(ForwarderError::Request(e)) if e.is_connect() => DeliveryOutcome::ConnectionFailure {
            elapsed,
            error: error_chain(&e),
            timed_out: e.is_timeout(),
        },
        Err(e) => DeliveryOutcome::Unclassified {
            elapsed,
            error: error_chain(&e),
        },
    }
}

fn log_outcome(request: &OutgoingRequest, origin: &str, outcome: &DeliveryOutcome) {
    let elapsed_ms = outcome.elapsed_ms();

    match outcome {
        DeliveryOutcome::Delivered { response, .. } => {
            if outcome.is_success() {
                tracing::info!(
                    url = %request.url,
                    origin,
                    request_headers = ?request.headers,
                    request_body = %request.body,
                    elapsed_ms,
                    status = response.status,
                    reason = response.reason.as_deref().unwrap_or(""),
                    response_headers = ?response.headers,
                    response_body = %response.body,
                    "Webhook delivered"
                );
            } else {
                tracing::warn!(
                    url = %request.url,
                    origin,
                    request_headers = ?request.headers,
                    request_body = %request.body,
                    elapsed_ms,
                    status = response.status,
                    reason = response.reason.as_deref().unwrap_or(""),
                    response_headers = ?response.headers,
                    response_body = %response.body,
                    curl = %request.curl(),
                    "Webhook answered with a non-success status"
                );
            }
        }
        DeliveryOutcome::Timeout { deadline, .. } => {
            tracing::warn!(
                url = %request.url,
                origin,
                request_headers = ?request.headers,
                request_body = %request.body,
                elapsed_ms,
                deadline_secs = deadline.as_secs_f64(),
                curl = %request.curl(),
                "Webhook timed out; the host may be cold-starting"
            );
        }
        DeliveryOutcome::ConnectionFailure {
            error, timed_out, ..
        } => {
            tracing::warn!(
                url = %request.url,
                origin,
                request_headers = ?request.headers,
                request_body = %request.body,
                elapsed_ms,
                connect_timed_out = timed_out,
                error = %error,
                curl = %request.curl(),
                "Could not connect to webhook"
            );
        }
        DeliveryOutcome::Unclassified { error, .. } => {
            tracing::error!(
                url = %request.url,
                origin,
                request_headers = ?request.headers,
                request_body = %request.body,
                elapsed_ms,
                error = %error,
                curl = %request.curl(),
                "Webhook delivery failed"
            );
        }
    }
}

fn record_metrics(outcome: &DeliveryOutcome) {
    let kind = outcome.kind().as_str();
    shared::counter!(WEBHOOK_DELIVERIES, "outcome" => kind).increment(1);
    shared::histogram!(WEBHOOK_DELIVERY_DURATION, "outcome" => kind)
        .record(outcome.elapsed().as_secs_f64());
}
