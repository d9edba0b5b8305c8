//! Method registry: explicit name → handler registration plus the
//! self-describing introspection manifest.

use std::{collections::HashMap, future::Future, pin::Pin};

use serde_json::Value;
use thiserror::Error;

use manifold_protocol::{InspectionManifest, ManifestEntry};

use crate::channel::ResultSink;

// ── Types ────────────────────────────────────────────────────────────────────

/// A boxed async method handler.
///
/// Handlers receive the validated argument sequence and the call's result
/// sink; they report single-shot, streamed, or error results through the
/// sink and may outlive the dispatch loop iteration that spawned them.
pub type HandlerFn = Box<
    dyn Fn(Vec<Value>, ResultSink) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

struct RegisteredMethod {
    /// Declared parameter names, excluding the trailing result-sink slot.
    params: Vec<String>,
    handler: HandlerFn,
}

/// Registration-time failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Leading-underscore names are reserved for synthetic methods.
    #[error("method name `{0}` is reserved (leading underscore)")]
    Reserved(String),
    #[error("method `{0}` is already registered")]
    Duplicate(String),
}

// ── Method registry ──────────────────────────────────────────────────────────

/// Snapshot of a service's invocable methods.
///
/// Built by explicit registration before server construction and read-only
/// afterwards: the server consumes the registry by value, so methods added
/// later are simply never part of that server's dispatch table.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, RegisteredMethod>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under `name` with its ordered parameter names
    /// (excluding the trailing result-sink slot).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        params: &[&str],
        handler: HandlerFn,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.starts_with('_') {
            return Err(RegistryError::Reserved(name));
        }
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.handlers.insert(name, RegisteredMethod {
            params: params.iter().map(|p| (*p).to_string()).collect(),
            handler,
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invoke a registered handler. Returns `false` when the name is
    /// unknown (the sink is dropped unused in that case).
    pub(crate) fn invoke(&self, name: &str, args: Vec<Value>, sink: ResultSink) -> bool {
        match self.handlers.get(name) {
            Some(method) => {
                tokio::spawn((method.handler)(args, sink));
                true
            },
            None => false,
        }
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the introspection manifest from every registered method.
    ///
    /// The synthetic inspect method itself is not listed; the manifest
    /// describes the service's own surface.
    pub fn manifest(&self) -> InspectionManifest {
        let mut entries: Vec<ManifestEntry> = self
            .handlers
            .iter()
            .map(|(name, method)| ManifestEntry {
                name: name.clone(),
                params: method.params.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        InspectionManifest { entries }
    }
}
