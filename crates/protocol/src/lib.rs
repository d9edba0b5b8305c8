//! Wire-level types for the manifold RPC result protocol.
//!
//! A call's reply is a sequence of frames on its own channel: zero or more
//! `STREAM` frames followed by one terminal frame (`OK`, `ERR`, or
//! `STREAM_DONE`). This crate defines those frames, the error shapes that
//! travel in them, the incoming request envelope, and the introspection
//! manifest served to remote callers.

pub mod error;
pub mod frame;
pub mod manifest;
pub mod request;

pub use error::{ProtocolError, RemoteError, TransportError};
pub use frame::{FrameKind, ResultFrame};
pub use manifest::{INSPECT_METHOD, InspectionManifest, ManifestEntry};
pub use request::IncomingRequest;
