use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key identifying the route that triggered a delivery.
pub const ORIGIN_ENDPOINT_KEY: &str = "origin_endpoint";
/// Key carrying the deployment tag of the sender.
pub const ENVIRONMENT_KEY: &str = "environment";
pub const EVENT_KEY: &str = "evento";
pub const TIMESTAMP_KEY: &str = "timestamp";

#[derive(thiserror::Error, Debug)]
#[error("payload must be a JSON object, got {0}")]
pub struct NotAnObject(&'static str);

/// Insertion-ordered JSON object sent to the webhook.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(IndexMap<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Payload(IndexMap::new())
    }

    /// Starts an event payload with the fields every relay event carries.
    pub fn event(name: &str, timestamp: DateTime<Utc>) -> Self {
        Payload::new()
            .with(EVENT_KEY, name)
            .with(
                TIMESTAMP_KEY,
                timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or overwrites a field. An overwritten key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Builds the payload actually transmitted for a delivery.
    ///
    /// `self` is left untouched; the delivery metadata goes into a copy.
    pub fn derive(&self, origin: &str, environment: &str) -> Payload {
        let mut copy = self.clone();
        copy.insert(ORIGIN_ENDPOINT_KEY, origin);
        copy.insert(ENVIRONMENT_KEY, environment);
        copy
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Payload(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl TryFrom<Value> for Payload {
    type Error = NotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Err(NotAnObject("null")),
            Value::Bool(_) => Err(NotAnObject("a boolean")),
            Value::Number(_) => Err(NotAnObject("a number")),
            Value::String(_) => Err(NotAnObject("a string")),
            Value::Array(_) => Err(NotAnObject("an array")),
        }
    }
}
