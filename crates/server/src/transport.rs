//! The transport boundary: what the dispatch core needs from a multiplexed
//! transport, and nothing more.

use std::sync::Arc;

use async_trait::async_trait;

use manifold_protocol::{IncomingRequest, ResultFrame, TransportError};

/// A multiplexed transport hosting the server side of the protocol.
///
/// Implementations own framing, wire encoding, and connection management.
/// The dispatcher only consumes the request-received notification and opens
/// one [`CallChannel`] per accepted request.
#[async_trait]
pub trait ServerTransport: Send + Sync + 'static {
    /// Listen on an endpoint.
    async fn bind(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Connect out to an endpoint.
    async fn connect(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Next incoming request, or `None` once the transport has closed.
    async fn recv_request(&self) -> Option<IncomingRequest>;

    /// Open the logical reply channel for a request.
    fn open_channel(
        &self,
        request: &IncomingRequest,
    ) -> Result<Arc<dyn CallChannel>, TransportError>;

    /// Shut the transport down. In-flight channels are not drained.
    async fn close(&self) -> Result<(), TransportError>;
}

/// One logical, independently closable reply channel.
///
/// `send` is a synchronous enqueue: frame ordering on the wire is the
/// order of successful `send` calls.
pub trait CallChannel: Send + Sync {
    /// Transport-assigned channel id.
    fn id(&self) -> u64;

    /// Enqueue a result frame.
    fn send(&self, frame: ResultFrame) -> Result<(), TransportError>;

    /// Emit one liveness signal to the peer.
    fn heartbeat(&self) -> Result<(), TransportError>;

    /// Release transport resources. Idempotent.
    fn close(&self);
}
