use clap::Parser;
use config::{Config, ConfigError};
use errors::RelayError;
use forwarder::keepalive::{
    DEFAULT_INTERVAL_SECS, DEFAULT_PING_TIMEOUT_SECS, KeepAlive, KeepAliveConfig,
};
use forwarder::{Payload, WebhookForwarder};
use gateway::AppState;
use gateway::completion::OpenAiCompatibleClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod config;
mod errors;
mod observability;

#[derive(Parser)]
#[command(version, about = "Gastos relay: query API and webhook forwarder")]
enum CliCommand {
    /// Runs the HTTP API.
    Serve {
        #[arg(long)]
        config: PathBuf,
    },
    /// Pings a URL on an interval so the host does not go to sleep.
    KeepAlive {
        #[arg(long)]
        url: Url,
        #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
        #[arg(long, default_value_t = DEFAULT_PING_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: u64,
        /// Stop after this many hours. 0 runs forever.
        #[arg(long, default_value_t = 0)]
        hours: u64,
    },
    /// Forwards one JSON object to the configured webhook and prints the outcome.
    Send {
        #[arg(long)]
        config: PathBuf,
        /// Route name recorded as `origin_endpoint`.
        #[arg(long, default_value = "/manual")]
        origin: String,
        #[arg(long)]
        data: String,
    },
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    // A missing .env file is the normal case in deployments.
    dotenvy::dotenv().ok();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliCommand) -> Result<ExitCode, RelayError> {
    match cli {
        CliCommand::Serve { config } => {
            let config = Config::load(&config)?;
            let _sentry = observability::init_logging(config.common.logging.as_ref());
            if let Some(metrics) = &config.common.metrics {
                observability::init_metrics(metrics)?;
            }
            config.gateway.validate().map_err(ConfigError::from)?;
            config.forwarder.validate().map_err(ConfigError::from)?;

            runtime()?.block_on(serve(config))?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::KeepAlive {
            url,
            interval_secs,
            timeout_secs,
            hours,
        } => {
            let _sentry = observability::init_logging(None);
            let keepalive = KeepAlive::new(KeepAliveConfig {
                url,
                interval: Duration::from_secs(interval_secs),
                ping_timeout: Duration::from_secs(timeout_secs),
                run_for: (hours > 0).then(|| Duration::from_secs(hours.saturating_mul(3600))),
            })?;

            runtime()?.block_on(keepalive.run());
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Send {
            config,
            origin,
            data,
        } => {
            let config = Config::load(&config)?;
            let _sentry = observability::init_logging(config.common.logging.as_ref());
            config.forwarder.validate().map_err(ConfigError::from)?;

            let payload = Payload::try_from(serde_json::from_str::<serde_json::Value>(&data)?)?;
            let forwarder_config = config
                .forwarder
                .forwarder_config()
                .ok_or_else(|| RelayError::NoWebhook(config.forwarder.environment.clone()))?;
            let forwarder = WebhookForwarder::new(forwarder_config)?;

            let outcome = runtime()?.block_on(forwarder.send(&payload, &origin));
            println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
            if let Some(response) = outcome.response() {
                println!("{}", response.body);
            }

            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, RelayError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

async fn serve(config: Config) -> Result<(), RelayError> {
    let completion = OpenAiCompatibleClient::new(config.gateway.completion.clone())?;

    let forwarder = match config.forwarder.forwarder_config() {
        Some(forwarder_config) => {
            tracing::info!(
                url = %forwarder_config.webhook_url,
                environment = %forwarder_config.environment,
                "Webhook forwarding enabled"
            );
            Some(WebhookForwarder::new(forwarder_config)?)
        }
        None => {
            tracing::warn!(
                environment = %config.forwarder.environment,
                "No webhook configured for this environment, forwarding disabled"
            );
            None
        }
    };

    tracing::info!(
        model = %config.gateway.completion.model,
        endpoint = %completion.endpoint(),
        "Completion client ready"
    );
    let state = AppState::new(
        Arc::new(completion),
        forwarder,
        config.gateway.api_bearer_token.clone(),
        config.forwarder.environment.clone(),
    );

    gateway::serve(&config.gateway, state).await?;
    Ok(())
}
