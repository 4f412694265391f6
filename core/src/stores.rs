//! Store and registry trait seams.
//!
//! Backends live in `gateway-redis`; deterministic doubles live in
//! `gateway-testing`. Both key/value stores sit on the same substrate:
//! independent keys, last-write-wins, TTL expiry, safe for unlimited
//! concurrent callers. No cross-key locking or multi-key transactions.

use crate::error::Result;
use crate::record::OrderRecord;
use std::future::Future;
use std::time::Duration;

/// Dedup key for one logical action: `"{action}:{transaction_id}:{message_id}"`.
///
/// Namespacing by action name means unrelated actions never collide even
/// when handed the same transaction identifier.
#[must_use]
pub fn idempotency_key(action: &str, transaction_id: &str, message_id: &str) -> String {
    format!("{action}:{transaction_id}:{message_id}")
}

/// Replay store for previously computed responses.
///
/// Values are raw response bytes and MUST round-trip byte-for-byte: the
/// response content may itself be signed, and re-serializing it would
/// change the hash. Implementations never re-encode.
pub trait IdempotencyStore: Send + Sync {
    /// Look up a previously stored response.
    ///
    /// A miss is `Ok(None)` — it is a normal condition, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the store transport
    /// fails.
    fn check(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store raw response bytes under `key` with a TTL.
    ///
    /// Later stores with the same key simply overwrite; there are no merge
    /// semantics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the store transport
    /// fails.
    fn store(
        &self,
        key: &str,
        response: &[u8],
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Correlation store mapping any of four identifier types to one record.
///
/// Writes fan out to every non-empty lookup key so that each key resolves
/// to the same current snapshot. The fan-out is not transactional: a crash
/// mid-write can leave some keys stale. That window is accepted — the
/// identifiers are append-only, so a stale snapshot is missing fields, not
/// wrong ones.
pub trait OrderRecordStore: Send + Sync {
    /// Write the record under all of its non-empty lookup keys.
    ///
    /// Identical in effect to [`update`](Self::update); both merge with the
    /// current snapshot first so set identifiers are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the store transport
    /// fails.
    fn store(&self, record: &OrderRecord) -> impl Future<Output = Result<()>> + Send;

    /// Merge with the current snapshot, then fan out to all known keys.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the store transport
    /// fails.
    fn update(&self, record: &OrderRecord) -> impl Future<Output = Result<()>> + Send;

    /// Look up by search identifier.
    ///
    /// # Errors
    ///
    /// [`crate::GatewayError::NotFound`] on a miss (a normal business
    /// condition); [`crate::GatewayError::CorruptRecord`] if the stored
    /// value cannot be decoded (internal) — callers must treat the two
    /// differently.
    fn get_by_search_id(&self, search_id: &str)
    -> impl Future<Output = Result<OrderRecord>> + Send;

    /// Look up by quote identifier. Error contract as
    /// [`get_by_search_id`](Self::get_by_search_id).
    ///
    /// # Errors
    ///
    /// See [`get_by_search_id`](Self::get_by_search_id).
    fn get_by_quote_id(&self, quote_id: &str) -> impl Future<Output = Result<OrderRecord>> + Send;

    /// Look up by transaction identifier. Error contract as
    /// [`get_by_search_id`](Self::get_by_search_id).
    ///
    /// # Errors
    ///
    /// See [`get_by_search_id`](Self::get_by_search_id).
    fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<OrderRecord>> + Send;

    /// Look up by tenant-scoped order identifier. Error contract as
    /// [`get_by_search_id`](Self::get_by_search_id).
    ///
    /// # Errors
    ///
    /// See [`get_by_search_id`](Self::get_by_search_id).
    fn get_by_order_id(
        &self,
        client_id: &str,
        order_id: &str,
    ) -> impl Future<Output = Result<OrderRecord>> + Send;
}

/// Resolves counterparty public keys for signature verification.
///
/// Keyed by `(subscriber_id, unique_key_id)` against an external registry.
pub trait KeyRegistry: Send + Sync {
    /// Fetch the raw Ed25519 public key (32 bytes) for a counterparty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::AuthenticationFailed`] for an unknown
    /// key, or [`crate::GatewayError::Unavailable`] if the registry cannot
    /// be reached.
    fn public_key(
        &self,
        subscriber_id: &str,
        unique_key_id: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_namespaced_per_action() {
        let confirm = idempotency_key("confirm", "txn-1", "msg-1");
        let cancel = idempotency_key("cancel", "txn-1", "msg-1");
        assert_eq!(confirm, "confirm:txn-1:msg-1");
        assert_ne!(confirm, cancel);
    }
}
