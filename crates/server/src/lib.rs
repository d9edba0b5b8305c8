//! Server-side dispatch core for the manifold RPC protocol.
//!
//! Lifecycle:
//! 1. Register methods (name, parameter names, async handler)
//! 2. Construct the server over a transport, keeping the error stream
//! 3. Bind or connect the transport, then drive the serve loop
//! 4. Each matched request gets its own channel + heartbeat; the handler
//!    reports results through a [`ResultSink`], which frames them as
//!    OK / STREAM / STREAM_DONE / ERR and closes the channel on the
//!    terminal frame
//!
//! The transport itself (framing, wire encoding, connection management) is
//! an external collaborator behind the [`ServerTransport`] trait.

pub mod channel;
pub mod heartbeat;
pub mod registry;
pub mod server;
pub mod transport;

pub use channel::{Channel, ResultSink, SinkError};
pub use heartbeat::HeartbeatGuard;
pub use registry::{HandlerFn, MethodRegistry, RegistryError};
pub use server::{Server, ServerError, ServerOptions};
pub use transport::{CallChannel, ServerTransport};
