//! Result frames: one discrete unit of the reply protocol per channel.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::RemoteError;

// ── Frame kinds ──────────────────────────────────────────────────────────────

/// The four frame kinds of the result protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameKind {
    /// Single-shot reply; payload is a one-element sequence wrapping the item.
    Ok,
    /// One streamed item; payload is the raw item.
    Stream,
    /// End of a stream; payload is an empty sequence.
    StreamDone,
    /// Application failure; payload is the `[type, message, stack]` triple.
    Err,
}

// ── Result frame ─────────────────────────────────────────────────────────────

/// One frame of a call's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    pub kind: FrameKind,
    pub payload: Value,
}

impl ResultFrame {
    /// Single-shot OK frame. A missing item encodes as `null`.
    pub fn ok(item: Value) -> Self {
        Self {
            kind: FrameKind::Ok,
            payload: json!([item]),
        }
    }

    /// One streamed item, unwrapped.
    pub fn stream(item: Value) -> Self {
        Self {
            kind: FrameKind::Stream,
            payload: item,
        }
    }

    /// Stream terminator with empty payload.
    pub fn stream_done() -> Self {
        Self {
            kind: FrameKind::StreamDone,
            payload: json!([]),
        }
    }

    /// Error frame carrying the `[type, message, stack]` triple.
    pub fn err(error: &RemoteError) -> Self {
        Self {
            kind: FrameKind::Err,
            payload: error.to_payload(),
        }
    }

    /// Whether this frame ends its channel. `OK`, `ERR` and `STREAM_DONE`
    /// are all terminal; only `STREAM` leaves the channel open.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, FrameKind::Stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_wraps_item_in_single_element_sequence() {
        let frame = ResultFrame::ok(json!(3));
        assert_eq!(frame.kind, FrameKind::Ok);
        assert_eq!(frame.payload, json!([3]));
    }

    #[test]
    fn ok_with_null_item() {
        assert_eq!(ResultFrame::ok(Value::Null).payload, json!([null]));
    }

    #[test]
    fn stream_carries_raw_item() {
        let frame = ResultFrame::stream(json!({"n": 1}));
        assert_eq!(frame.payload, json!({"n": 1}));
    }

    #[test]
    fn stream_done_is_empty_sequence() {
        assert_eq!(ResultFrame::stream_done().payload, json!([]));
    }

    #[test]
    fn err_carries_triple() {
        let frame = ResultFrame::err(&RemoteError::new("boom"));
        assert_eq!(frame.kind, FrameKind::Err);
        assert_eq!(frame.payload, json!(["Error", "boom", ""]));
    }

    #[test]
    fn terminality() {
        assert!(ResultFrame::ok(json!(1)).is_terminal());
        assert!(ResultFrame::stream_done().is_terminal());
        assert!(ResultFrame::err(&RemoteError::new("x")).is_terminal());
        assert!(!ResultFrame::stream(json!(1)).is_terminal());
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&FrameKind::StreamDone).unwrap();
        assert_eq!(json, "\"STREAM_DONE\"");
    }
}
