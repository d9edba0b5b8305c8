//! In-process transport for manifold.
//!
//! Frames pass through async channels with no serialization; every reply
//! channel reports its frames, heartbeats, and close on one shared event
//! stream. This is the semantic reference transport: it exists for tests
//! and local wiring, and other transports must behave identically at the
//! trait boundary.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use manifold_protocol::{IncomingRequest, ResultFrame, TransportError};
use manifold_server::{CallChannel, ServerTransport};

// ── Channel events ───────────────────────────────────────────────────────────

/// Everything observable on one reply channel, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Frame(ResultFrame),
    Heartbeat,
    Closed,
}

// ── Transport ────────────────────────────────────────────────────────────────

/// In-process server transport.
///
/// Tests push requests with [`MemTransport::push`] and observe every
/// channel's lifecycle on the event stream returned by
/// [`MemTransport::new`].
pub struct MemTransport {
    /// Taken on close so a pending `recv_request` resolves to `None`.
    requests_tx: Mutex<Option<mpsc::UnboundedSender<IncomingRequest>>>,
    requests_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingRequest>>,
    events: mpsc::UnboundedSender<(u64, ChannelEvent)>,
    next_channel_id: AtomicU64,
    endpoint: Mutex<Option<String>>,
    closed: AtomicBool,
    fail_heartbeats: Arc<AtomicBool>,
}

impl MemTransport {
    /// Create a transport together with its channel event stream.
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<(u64, ChannelEvent)>,
    ) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            requests_tx: Mutex::new(Some(requests_tx)),
            requests_rx: tokio::sync::Mutex::new(requests_rx),
            events,
            next_channel_id: AtomicU64::new(1),
            endpoint: Mutex::new(None),
            closed: AtomicBool::new(false),
            fail_heartbeats: Arc::new(AtomicBool::new(false)),
        });
        (transport, events_rx)
    }

    /// Deliver one request to the server side. Returns false once the
    /// transport has closed.
    pub fn push(&self, request: IncomingRequest) -> bool {
        match self.lock_requests_tx().as_ref() {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }

    /// Make every subsequent heartbeat fail, simulating a dead peer.
    pub fn fail_heartbeats(&self) {
        self.fail_heartbeats.store(true, Ordering::Release);
    }

    /// Endpoint recorded by the last `bind`/`connect`.
    pub fn endpoint(&self) -> Option<String> {
        self.lock_endpoint().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_requests_tx(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<IncomingRequest>>> {
        self.requests_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_endpoint(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.endpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ServerTransport for MemTransport {
    async fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        *self.lock_endpoint() = Some(endpoint.to_string());
        Ok(())
    }

    async fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        // In-process: binding and connecting are the same bookkeeping.
        self.bind(endpoint).await
    }

    async fn recv_request(&self) -> Option<IncomingRequest> {
        let mut rx = self.requests_rx.lock().await;
        rx.recv().await
    }

    fn open_channel(
        &self,
        _request: &IncomingRequest,
    ) -> Result<Arc<dyn CallChannel>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let id = self.next_channel_id.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemChannel {
            id,
            events: self.events.clone(),
            closed: AtomicBool::new(false),
            fail_heartbeats: Arc::clone(&self.fail_heartbeats),
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        // Dropping the sender ends the request stream.
        self.lock_requests_tx().take();
        Ok(())
    }
}

// ── Reply channel ────────────────────────────────────────────────────────────

struct MemChannel {
    id: u64,
    events: mpsc::UnboundedSender<(u64, ChannelEvent)>,
    closed: AtomicBool,
    fail_heartbeats: Arc<AtomicBool>,
}

impl CallChannel for MemChannel {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, frame: ResultFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed(self.id));
        }
        self.events
            .send((self.id, ChannelEvent::Frame(frame)))
            .map_err(|_| TransportError::Closed)
    }

    fn heartbeat(&self) -> Result<(), TransportError> {
        if self.fail_heartbeats.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ChannelClosed(self.id));
        }
        self.events
            .send((self.id, ChannelEvent::Heartbeat))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.events.send((self.id, ChannelEvent::Closed));
        }
    }
}
