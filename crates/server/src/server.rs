//! The dispatcher: binds a method registry to a transport and routes each
//! incoming request onto its own channel.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use manifold_protocol::{
    INSPECT_METHOD, IncomingRequest, ProtocolError, TransportError, error::json_type_name,
};

use crate::{
    channel::{Channel, ResultSink},
    heartbeat::HeartbeatGuard,
    registry::MethodRegistry,
    transport::ServerTransport,
};

// ── Server errors ────────────────────────────────────────────────────────────

/// Failures not attributable to a specific call's application logic,
/// delivered on the error stream returned by [`Server::new`].
///
/// Application errors never appear here: they travel as ERR frames on
/// their own channel and affect nothing else.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("heartbeat failed on channel {channel}: {source}")]
    Heartbeat {
        channel: u64,
        source: TransportError,
    },
}

// ── Options ──────────────────────────────────────────────────────────────────

/// Server construction options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Heartbeat interval for every call channel.
    pub heartbeat: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(5),
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// The dispatch core: method registry + transport + per-call channels.
pub struct Server {
    registry: MethodRegistry,
    /// Manifest wire value, precomputed at construction (the registry is
    /// immutable from here on).
    manifest: Value,
    transport: Arc<dyn ServerTransport>,
    options: ServerOptions,
    errors: mpsc::UnboundedSender<ServerError>,
}

impl Server {
    /// Build a server over a transport. Returns the server together with
    /// its error stream: protocol, transport, and heartbeat failures that
    /// are not any one call's application error arrive there.
    pub fn new(
        registry: MethodRegistry,
        transport: Arc<dyn ServerTransport>,
        options: ServerOptions,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerError>) {
        let (errors, errors_rx) = mpsc::unbounded_channel();
        let manifest = registry.manifest().to_value();
        let server = Arc::new(Self {
            registry,
            manifest,
            transport,
            options,
            errors,
        });
        (server, errors_rx)
    }

    /// Listen on an endpoint. Delegates to the transport.
    pub async fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        self.transport.bind(endpoint).await
    }

    /// Connect out to an endpoint. Delegates to the transport.
    pub async fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.transport.connect(endpoint).await
    }

    /// Shut the transport down. In-flight channels are not drained.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    /// Registered method names plus the synthetic inspect method.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = self.registry.method_names();
        names.push(INSPECT_METHOD.to_string());
        names
    }

    /// The serve loop: consume request notifications until the transport
    /// closes. Each request is handled serially up to the point the
    /// handler future is spawned; calls then complete concurrently.
    pub async fn run(&self) {
        while let Some(request) = self.transport.recv_request().await {
            self.handle_request(request);
        }
        debug!("transport closed, serve loop ending");
    }

    fn handle_request(&self, request: IncomingRequest) {
        let is_inspect = request.name == INSPECT_METHOD;
        if !is_inspect && !self.registry.contains(&request.name) {
            // Inherited behavior: unknown methods are dropped without a
            // frame or an error emission.
            debug!(method = %request.name, "dropping request for unknown method");
            return;
        }

        let reply = match self.transport.open_channel(&request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(method = %request.name, error = %e, "failed to open channel");
                let _ = self.errors.send(ServerError::Transport(e));
                return;
            },
        };

        let heartbeat = HeartbeatGuard::spawn(
            self.options.heartbeat,
            Arc::clone(&reply),
            self.errors.clone(),
        );
        let channel = Channel::open(reply, heartbeat);

        // Arguments must be an ordered sequence; anything else aborts the
        // call before the method is ever invoked.
        let args = match request.args {
            Value::Array(items) => items,
            other => {
                let _ = self
                    .errors
                    .send(ServerError::Protocol(ProtocolError::ArgsNotSequence {
                        method: request.name.clone(),
                        got: json_type_name(&other),
                    }));
                channel.close();
                return;
            },
        };

        let sink = ResultSink::new(channel);
        debug!(method = %request.name, channel = sink.channel_id(), "dispatching");

        if is_inspect {
            // Single-shot manifest reply; no further arguments consumed.
            if let Err(e) = sink.ok(self.manifest.clone()) {
                warn!(error = %e, "failed to send inspection manifest");
            }
            return;
        }

        // Presence was checked above; the registry spawns the handler.
        self.registry.invoke(&request.name, args, sink);
    }
}
