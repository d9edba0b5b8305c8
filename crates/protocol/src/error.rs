//! Error shapes: the wire-level error triple plus the protocol and
//! transport failure taxonomies.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

// ── Remote (application) errors ──────────────────────────────────────────────

/// Default error type name when a caller supplies none.
pub const DEFAULT_ERROR_KIND: &str = "Error";

/// The `[type, message, stack]` triple carried by an ERR frame.
///
/// Produced when an exposed method reports a failure through its result
/// sink. Scoped strictly to the originating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error type name; defaults to `"Error"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    /// Stack trace or origin description; empty when unavailable.
    pub stack: String,
}

impl RemoteError {
    /// An error with the default `"Error"` type.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named(DEFAULT_ERROR_KIND, message)
    }

    /// An error with an explicit type name. An empty name normalizes to
    /// the default.
    pub fn named(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            kind: if kind.is_empty() {
                DEFAULT_ERROR_KIND.to_string()
            } else {
                kind
            },
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// The positional wire payload for an ERR frame.
    pub fn to_payload(&self) -> Value {
        json!([self.kind, self.message, self.stack])
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

// ── Protocol errors ──────────────────────────────────────────────────────────

/// A malformed request. Aborts only the offending call; the method is
/// never invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("arguments for method `{method}` must be an ordered sequence, got {got}")]
    ArgsNotSequence {
        method: String,
        /// JSON type name of what actually arrived.
        got: &'static str,
    },
}

/// JSON type name for protocol error reporting.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

// ── Transport errors ─────────────────────────────────────────────────────────

/// Failures bubbled up from the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("channel {0} is closed")]
    ChannelClosed(u64),
    #[error("transport is closed")]
    Closed,
    #[error("endpoint error: {0}")]
    Endpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_kind_to_error() {
        let e = RemoteError::new("boom");
        assert_eq!(e.kind, "Error");
        assert_eq!(e.message, "boom");
        assert_eq!(e.stack, "");
    }

    #[test]
    fn empty_kind_normalizes_to_default() {
        assert_eq!(RemoteError::named("", "boom").kind, "Error");
        assert_eq!(RemoteError::named("TypeError", "boom").kind, "TypeError");
    }

    #[test]
    fn payload_is_positional_triple() {
        let e = RemoteError::named("TypeError", "bad arg").with_stack("at add()");
        assert_eq!(e.to_payload(), json!(["TypeError", "bad arg", "at add()"]));
    }

    #[test]
    fn json_type_names() {
        assert_eq!(json_type_name(&json!(null)), "null");
        assert_eq!(json_type_name(&json!({"a": 1})), "a map");
        assert_eq!(json_type_name(&json!([1])), "a sequence");
        assert_eq!(json_type_name(&json!("x")), "a string");
    }
}
