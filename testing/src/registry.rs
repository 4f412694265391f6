//! Fixed-map key registry.

use gateway_core::{GatewayError, KeyRegistry, Result};
use std::collections::HashMap;

/// [`KeyRegistry`] backed by a fixed map, for verification tests.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyRegistry {
    keys: HashMap<(String, String), Vec<u8>>,
}

impl StaticKeyRegistry {
    /// Create a registry that knows no keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public key for a subscriber/key-id pair.
    pub fn insert(
        &mut self,
        subscriber_id: impl Into<String>,
        unique_key_id: impl Into<String>,
        public_key: Vec<u8>,
    ) {
        self.keys
            .insert((subscriber_id.into(), unique_key_id.into()), public_key);
    }
}

impl KeyRegistry for StaticKeyRegistry {
    async fn public_key(&self, subscriber_id: &str, unique_key_id: &str) -> Result<Vec<u8>> {
        self.keys
            .get(&(subscriber_id.to_string(), unique_key_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                GatewayError::AuthenticationFailed(format!(
                    "Unknown key {subscriber_id}|{unique_key_id}"
                ))
            })
    }
}
