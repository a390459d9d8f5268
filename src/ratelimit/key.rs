//! Composite store keys.

/// Separator used when rendering a key as a single string.
pub const KEY_SEPARATOR: char = ':';

/// A key that uniquely identifies one quota bucket.
///
/// The endpoint tag and client identity are kept apart so that tags or
/// identities containing the separator can never collide with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// Caller-chosen tag for the logical operation
    pub endpoint: String,
    /// Opaque client identity
    pub client: String,
}

impl LimitKey {
    /// Create a new key from an endpoint tag and client identity.
    pub fn new(endpoint: &str, client: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: client.to_string(),
        }
    }

    /// Render the key as `endpoint:client`.
    ///
    /// This is useful for logging and debugging.
    pub fn to_string_key(&self) -> String {
        format!("{}{}{}", self.endpoint, KEY_SEPARATOR, self.client)
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
