//! Per-call channel: the result-protocol state machine.
//!
//! Each accepted request owns one channel. The application handler reports
//! results through a [`ResultSink`]; the channel translates each report
//! into zero or more ordered frames and closes itself on the terminal one,
//! cancelling its heartbeat in the same transition.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use manifold_protocol::{RemoteError, ResultFrame, TransportError};

use crate::{heartbeat::HeartbeatGuard, transport::CallChannel};

// ── Channel state ────────────────────────────────────────────────────────────

/// Explicit per-channel state with guarded transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    /// `first` is true until the first sink invocation completes.
    Open { first: bool },
    Closed,
}

/// Result-sink misuse and delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink was invoked after its call already completed. This is a
    /// bug in the exposed method, surfaced as a typed failure rather than
    /// swallowed.
    #[error("result sink used after channel {0} already closed")]
    ChannelClosed(u64),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ── Channel ──────────────────────────────────────────────────────────────────

/// One call's logical channel, bound 1:1 to a heartbeat guard.
pub struct Channel {
    transport: Arc<dyn CallChannel>,
    heartbeat: HeartbeatGuard,
    state: Mutex<ChannelState>,
}

impl Channel {
    /// Open a channel over a transport reply channel, taking ownership of
    /// its heartbeat guard.
    pub fn open(transport: Arc<dyn CallChannel>, heartbeat: HeartbeatGuard) -> Arc<Self> {
        Arc::new(Self {
            transport,
            heartbeat,
            state: Mutex::new(ChannelState::Open { first: true }),
        })
    }

    pub fn id(&self) -> u64 {
        self.transport.id()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_state(), ChannelState::Closed)
    }

    /// Close the channel: cancel the heartbeat, then release the
    /// transport channel. No-op if already closed, so the heartbeat is
    /// cancelled exactly once whatever the close reason.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if *state != ChannelState::Closed {
            self.close_locked(&mut state);
        }
    }

    fn close_locked(&self, state: &mut ChannelState) {
        if *state == ChannelState::Closed {
            return;
        }
        *state = ChannelState::Closed;
        self.heartbeat.cancel();
        self.transport.close();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        // The mutex is only held across synchronous frame enqueues; a
        // poisoned lock means a panic mid-send, where closed is the only
        // safe reading.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The result-sink state machine. See [`ResultSink::emit`] for the
    /// contract; this is the single place frames are produced.
    fn emit(
        &self,
        error: Option<RemoteError>,
        item: Option<Value>,
        more: bool,
    ) -> Result<(), SinkError> {
        let mut state = self.lock_state();
        let first = match *state {
            ChannelState::Closed => return Err(SinkError::ChannelClosed(self.id())),
            ChannelState::Open { first } => first,
        };

        // Error path: terminal regardless of `more`.
        if let Some(err) = error {
            let sent = self.send_locked(&mut state, ResultFrame::err(&err));
            self.close_locked(&mut state);
            return sent;
        }

        // Legacy single-reply: first invocation already signals completion.
        if first && !more {
            let item = item.unwrap_or(Value::Null);
            let sent = self.send_locked(&mut state, ResultFrame::ok(item));
            self.close_locked(&mut state);
            return sent;
        }

        if let Some(item) = item {
            self.send_locked(&mut state, ResultFrame::stream(item))?;
        }
        if more {
            *state = ChannelState::Open { first: false };
            return Ok(());
        }

        // Completion after at least one prior invocation: explicit
        // stream terminator, then close.
        let sent = self.send_locked(&mut state, ResultFrame::stream_done());
        self.close_locked(&mut state);
        sent
    }

    /// Enqueue one frame; a transport failure closes the channel so its
    /// heartbeat cannot outlive a dead transport.
    fn send_locked(
        &self,
        state: &mut ChannelState,
        frame: ResultFrame,
    ) -> Result<(), SinkError> {
        match self.transport.send(frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close_locked(state);
                Err(SinkError::Transport(e))
            },
        }
    }
}

// ── Result sink ──────────────────────────────────────────────────────────────

/// The handle an exposed method uses to report its results.
///
/// Cloneable; all clones drive the same channel state machine.
#[derive(Clone)]
pub struct ResultSink {
    channel: Arc<Channel>,
}

impl ResultSink {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self { channel }
    }

    /// The result-sink contract: `emit(error, item, more)`.
    ///
    /// - `error` set → ERR frame with the `[type, message, stack]`
    ///   triple; terminal regardless of `more`.
    /// - first invocation with `more == false` → one OK frame wrapping
    ///   `item` in a single-element sequence; no STREAM_DONE follows.
    /// - otherwise → STREAM frame for a present `item`; `more == false`
    ///   additionally sends STREAM_DONE (the call had streamed before)
    ///   and closes the channel.
    /// - any invocation after a terminal frame →
    ///   [`SinkError::ChannelClosed`].
    pub fn emit(
        &self,
        error: Option<RemoteError>,
        item: Option<Value>,
        more: bool,
    ) -> Result<(), SinkError> {
        self.channel.emit(error, item, more)
    }

    /// Single-shot success reply.
    pub fn ok(&self, item: Value) -> Result<(), SinkError> {
        self.emit(None, Some(item), false)
    }

    /// One streamed item; the call stays open.
    pub fn stream(&self, item: Value) -> Result<(), SinkError> {
        self.emit(None, Some(item), true)
    }

    /// Finish the call. After streamed items this sends STREAM_DONE; as
    /// the very first invocation it is a single-shot `OK [null]` reply
    /// instead (the legacy single-reply rule applies to an empty reply
    /// too).
    pub fn done(&self) -> Result<(), SinkError> {
        self.emit(None, None, false)
    }

    /// Fail the call.
    pub fn error(&self, err: RemoteError) -> Result<(), SinkError> {
        self.emit(Some(err), None, false)
    }

    /// Transport-assigned id of the underlying channel.
    pub fn channel_id(&self) -> u64 {
        self.channel.id()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    };

    use serde_json::json;

    use manifold_protocol::FrameKind;

    use super::*;

    /// Stub reply channel recording every frame it is asked to send.
    #[derive(Default)]
    struct RecordingChannel {
        frames: StdMutex<Vec<ResultFrame>>,
        closed: AtomicBool,
        fail_sends: AtomicBool,
    }

    impl RecordingChannel {
        fn frames(&self) -> Vec<ResultFrame> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl CallChannel for RecordingChannel {
        fn id(&self) -> u64 {
            7
        }

        fn send(&self, frame: ResultFrame) -> Result<(), TransportError> {
            if self.fail_sends.load(Ordering::Acquire) {
                return Err(TransportError::ChannelClosed(7));
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        fn heartbeat(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    fn sink_over(transport: Arc<RecordingChannel>) -> (ResultSink, Arc<Channel>) {
        let channel = Channel::open(transport, HeartbeatGuard::noop());
        (ResultSink::new(Arc::clone(&channel)), channel)
    }

    #[tokio::test]
    async fn single_shot_ok_wraps_item_and_closes() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, channel) = sink_over(Arc::clone(&transport));

        sink.ok(json!(3)).unwrap();

        let frames = transport.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Ok);
        assert_eq!(frames[0].payload, json!([3]));
        assert!(channel.is_closed());
        assert!(transport.closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn stream_then_done_emits_terminator() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, channel) = sink_over(Arc::clone(&transport));

        sink.stream(json!("a")).unwrap();
        sink.stream(json!("b")).unwrap();
        sink.done().unwrap();

        let kinds: Vec<_> = transport.frames().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![
            FrameKind::Stream,
            FrameKind::Stream,
            FrameKind::StreamDone
        ]);
        assert_eq!(transport.frames()[0].payload, json!("a"));
        assert_eq!(transport.frames()[2].payload, json!([]));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn final_item_with_more_false_after_streaming() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, _channel) = sink_over(Arc::clone(&transport));

        sink.stream(json!(1)).unwrap();
        // Item plus completion in one invocation: STREAM then STREAM_DONE.
        sink.emit(None, Some(json!(2)), false).unwrap();

        let kinds: Vec<_> = transport.frames().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![
            FrameKind::Stream,
            FrameKind::Stream,
            FrameKind::StreamDone
        ]);
    }

    #[tokio::test]
    async fn error_is_terminal_even_with_more_true() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, channel) = sink_over(Arc::clone(&transport));

        sink.emit(Some(RemoteError::new("boom")), None, true).unwrap();

        let frames = transport.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Err);
        assert_eq!(frames[0].payload, json!(["Error", "boom", ""]));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn emit_after_terminal_is_typed_misuse() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, _channel) = sink_over(Arc::clone(&transport));

        sink.ok(json!(1)).unwrap();
        assert_eq!(sink.ok(json!(2)), Err(SinkError::ChannelClosed(7)));
        assert_eq!(sink.stream(json!(3)), Err(SinkError::ChannelClosed(7)));
        // Nothing leaked past the terminal frame.
        assert_eq!(transport.frames().len(), 1);
    }

    #[tokio::test]
    async fn done_as_first_invocation_is_a_null_single_shot() {
        let transport = Arc::new(RecordingChannel::default());
        let (sink, _channel) = sink_over(Arc::clone(&transport));

        sink.done().unwrap();

        let frames = transport.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Ok);
        assert_eq!(frames[0].payload, json!([null]));
    }

    #[tokio::test]
    async fn send_failure_closes_channel() {
        let transport = Arc::new(RecordingChannel::default());
        transport.fail_sends.store(true, Ordering::Release);
        let (sink, channel) = sink_over(Arc::clone(&transport));

        let err = sink.ok(json!(1)).unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
        assert!(channel.is_closed());
        // Follow-ups see the closed channel, not the transport.
        assert_eq!(sink.ok(json!(2)), Err(SinkError::ChannelClosed(7)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = Arc::new(RecordingChannel::default());
        let (_sink, channel) = sink_over(Arc::clone(&transport));

        channel.close();
        channel.close();
        assert!(channel.is_closed());
    }
}
