//! Metrics definitions for the forwarder.

use shared::metrics_defs::{MetricDef, MetricType};

pub const WEBHOOK_DELIVERIES: MetricDef = MetricDef {
    name: "webhook.deliveries",
    metric_type: MetricType::Counter,
    description: "Webhook delivery attempts. Tagged with outcome.",
};

pub const WEBHOOK_DELIVERY_DURATION: MetricDef = MetricDef {
    name: "webhook.delivery.duration",
    metric_type: MetricType::Histogram,
    description: "Webhook delivery wall time in seconds. Tagged with outcome.",
};

pub const KEEPALIVE_PINGS: MetricDef = MetricDef {
    name: "keepalive.pings",
    metric_type: MetricType::Counter,
    description: "Keep-alive pings sent. Tagged with result.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    WEBHOOK_DELIVERIES,
    WEBHOOK_DELIVERY_DURATION,
    KEEPALIVE_PINGS,
];
