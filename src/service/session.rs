//! Caller identity carried alongside a command.

use std::collections::HashMap;

pub const PRINCIPAL_ID: &str = "x-principal-id";
pub const TENANT_ID: &str = "x-tenant-id";

/// Session variables forwarded with the incoming message.
///
/// Over HTTP these are the request headers (lower-cased); over the bridge
/// they are the message metadata:
///
/// ```json
/// {
///   "x-principal-id": "user-42",
///   "x-tenant-id": "gymnazium"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    variables: HashMap<String, String>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session from a map of variables.
    pub fn from_map(variables: HashMap<String, String>) -> Self {
        Self { variables }
    }

    /// Create a session from key/value pairs such as bridge metadata.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        Self {
            variables: pairs
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        }
    }

    /// Get the principal ID (`x-principal-id`).
    pub fn principal_id(&self) -> Option<&str> {
        self.get(PRINCIPAL_ID)
    }

    /// Get the tenant ID (`x-tenant-id`).
    pub fn tenant_id(&self) -> Option<&str> {
        self.get(TENANT_ID)
    }

    /// Get a session variable by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|v| v.as_str())
    }

    /// Set a session variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Builder-style [`Session::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Check if a session variable exists.
    pub fn has(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Get all session variables.
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }
}
