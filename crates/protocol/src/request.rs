//! Incoming request envelope, as delivered by the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One incoming call. Transient: produced by the transport, consumed once
/// by the dispatcher.
///
/// `args` stays a raw value here; validating that it is a proper ordered
/// sequence is the dispatcher's job, not the transport's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingRequest {
    pub name: String,
    pub args: Value,
}

impl IncomingRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
