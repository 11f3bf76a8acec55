//! Best-effort delivery of relay events to an external workflow webhook.
//!
//! The entry point is [`WebhookForwarder::send`], which never fails: every
//! transport problem is folded into a [`DeliveryOutcome`] and logged.

pub mod config;
pub mod errors;
pub mod keepalive;
pub mod metrics_defs;
pub mod outcome;
pub mod payload;
pub mod repro;
mod webhook;

#[cfg(test)]
mod testutils;

pub use config::ForwarderConfig;
pub use errors::ForwarderError;
pub use outcome::{DeliveryOutcome, DeliveryResponse, DeliverySummary, OutcomeKind};
pub use payload::Payload;
pub use webhook::WebhookForwarder;
