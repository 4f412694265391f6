//! Redis-backed idempotent response replay.
//!
//! Values are the exact response bytes the handler originally produced.
//! They are written and read as raw byte strings — never decoded, never
//! re-encoded — because the response content may itself be signed and any
//! re-serialization would change its hash.

use gateway_core::{IdempotencyStore, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::unavailable;

/// Byte-verbatim replay store with TTL, on plain Redis keys.
///
/// # Key Format
///
/// `{prefix}:idempotency:{action}:{transaction_id}:{message_id}` — the
/// caller builds the action-scoped suffix with
/// [`gateway_core::idempotency_key`].
pub struct RedisIdempotencyStore {
    conn_manager: ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    /// Create a store sharing the given pooled connection.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn_manager,
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:idempotency:{key}", self.prefix)
    }
}

impl Clone for RedisIdempotencyStore {
    fn clone(&self) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

impl IdempotencyStore for RedisIdempotencyStore {
    async fn check(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let full_key = self.full_key(key);

        let stored: Option<Vec<u8>> = conn
            .get(&full_key)
            .await
            .map_err(|e| unavailable("Idempotency check failed", &e))?;

        match &stored {
            Some(bytes) => {
                tracing::debug!(key, bytes = bytes.len(), "Idempotency hit, replaying response");
            }
            None => tracing::trace!(key, "Idempotency miss"),
        }
        Ok(stored)
    }

    async fn store(&self, key: &str, response: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let full_key = self.full_key(key);
        let ttl_seconds = ttl.as_secs().max(1);

        let _: () = conn
            .set_ex(&full_key, response, ttl_seconds)
            .await
            .map_err(|e| unavailable("Idempotency store failed", &e))?;

        tracing::debug!(
            key,
            bytes = response.len(),
            ttl_seconds,
            "Stored idempotent response"
        );
        Ok(())
    }
}
