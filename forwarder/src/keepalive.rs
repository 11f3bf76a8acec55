//! Periodic pings that keep free-tier hosts from going to sleep.
//!
//! Hosting platforms idle a service after a stretch without traffic, and the
//! next webhook call then pays the cold start. Pinging the relay itself or
//! the workflow host on an interval avoids that.

use crate::errors::{ForwarderError, Result, error_chain};
use crate::metrics_defs::KEEPALIVE_PINGS;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use url::Url;

pub const DEFAULT_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct KeepAliveConfig {
    pub url: Url,
    pub interval: Duration,
    pub ping_timeout: Duration,
    /// Stop after this long. `None` runs until the process is stopped.
    pub run_for: Option<Duration>,
}

impl KeepAliveConfig {
    pub fn new(url: Url) -> Self {
        KeepAliveConfig {
            url,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            run_for: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingResult {
    Status(u16),
    Failed(String),
}

impl PingResult {
    fn label(&self) -> &'static str {
        match self {
            PingResult::Status(_) => "ok",
            PingResult::Failed(_) => "error",
        }
    }
}

pub struct KeepAlive {
    client: reqwest::Client,
    config: KeepAliveConfig,
}

impl KeepAlive {
    pub fn new(config: KeepAliveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.ping_timeout)
            .no_proxy()
            .build()
            .map_err(ForwarderError::ClientBuild)?;
        Ok(KeepAlive { client, config })
    }

    pub async fn ping(&self) -> PingResult {
        let result = match self.client.get(self.config.url.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::info!(url = %self.config.url, status, "Keep-alive ping");
                PingResult::Status(status)
            }
            Err(e) => {
                let error = error_chain(&e);
                tracing::warn!(url = %self.config.url, error = %error, "Keep-alive ping failed");
                PingResult::Failed(error)
            }
        };
        shared::counter!(KEEPALIVE_PINGS, "result" => result.label()).increment(1);
        result
    }

    /// Pings until `run_for` elapses. Returns the number of pings sent.
    ///
    /// A failed ping never stops the loop.
    pub async fn run(&self) -> u64 {
        let deadline = self.config.run_for.map(|run_for| Instant::now() + run_for);
        tracing::info!(
            url = %self.config.url,
            interval_secs = self.config.interval.as_secs_f64(),
            run_for_secs = self.config.run_for.map(|d| d.as_secs_f64()),
            "Keep-alive started"
        );

        let mut pings = 0;
        loop {
            self.ping().await;
            pings += 1;

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!(pings, "Keep-alive finished");
                return pings;
            }
            sleep(self.config.interval).await;
        }
    }
}
