//! Introspection manifest: the machine-readable description of a service's
//! exposed methods, served to remote callers for discovery.

use serde_json::{Value, json};

/// Name of the synthetic introspection method every server answers.
pub const INSPECT_METHOD: &str = "_zerorpc_inspect";

/// One exposed method: its name and declared parameter names, excluding
/// the trailing result-sink slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub params: Vec<String>,
}

/// The full manifest for a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionManifest {
    pub entries: Vec<ManifestEntry>,
}

impl InspectionManifest {
    /// Wire shape expected by cross-language callers:
    ///
    /// `{ "methods": [ [name, [ ["self", ...params], null, null, null ], "" ], ... ] }`
    ///
    /// `"self"` is prepended to each parameter list; the three nulls and
    /// the trailing empty string are reserved slots.
    pub fn to_value(&self) -> Value {
        let methods: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| {
                let mut argspec = vec![json!("self")];
                argspec.extend(entry.params.iter().map(|p| json!(p)));
                json!([entry.name, [argspec, null, null, null], ""])
            })
            .collect();
        json!({ "methods": methods })
    }
}
