//! Redis-backed order-record correlation store.
//!
//! One record, up to four keys: every write serializes the record once and
//! fans the same snapshot out under each non-empty lookup key with a
//! refreshed TTL, so any identifier resolves to the same current snapshot.
//!
//! The fan-out is not transactional. A crash between key writes leaves some
//! keys holding an older snapshot until the next update; since identifiers
//! are append-only, a stale snapshot is missing fields rather than holding
//! wrong ones. That window is accepted and documented, not hardened.

use gateway_core::record::{order_key, quote_key, search_key, transaction_key};
use gateway_core::{GatewayError, OrderRecord, OrderRecordStore, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::unavailable;

/// Four-key fan-out record store on plain Redis keys.
pub struct RedisOrderRecordStore {
    conn_manager: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl RedisOrderRecordStore {
    /// Create a store sharing the given pooled connection.
    ///
    /// `ttl` is the record lifetime, refreshed on every update.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn_manager,
            prefix: prefix.into(),
            ttl,
        }
    }

    async fn get_key(&self, key: &str) -> Result<OrderRecord> {
        let mut conn = self.conn_manager.clone();
        let stored: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| unavailable("Order record lookup failed", &e))?;

        let Some(bytes) = stored else {
            tracing::debug!(key, "Order record miss");
            return Err(GatewayError::NotFound);
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(key, error = %e, "Stored order record is undecodable");
            GatewayError::CorruptRecord(e.to_string())
        })
    }

    /// Current snapshot reachable from any of the record's keys, if one
    /// exists.
    async fn current_snapshot(&self, record: &OrderRecord) -> Result<Option<OrderRecord>> {
        for key in record.lookup_keys(&self.prefix) {
            match self.get_key(&key).await {
                Ok(existing) => return Ok(Some(existing)),
                Err(GatewayError::NotFound) => {}
                // A corrupt snapshot must not block the write path; the
                // update below replaces it.
                Err(GatewayError::CorruptRecord(reason)) => {
                    tracing::warn!(key, reason, "Replacing corrupt order record snapshot");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn upsert(&self, record: &OrderRecord) -> Result<()> {
        let mut merged = record.clone();
        if let Some(existing) = self.current_snapshot(record).await? {
            merged.merge_from(&existing);
        }

        let keys = merged.lookup_keys(&self.prefix);
        if keys.is_empty() {
            return Err(GatewayError::Serialization(
                "Order record has no lookup identifiers".to_string(),
            ));
        }

        // Serialize once; every key gets the identical snapshot.
        let bytes = serde_json::to_vec(&merged)
            .map_err(|e| GatewayError::Serialization(e.to_string()))?;
        let ttl_seconds = self.ttl.as_secs().max(1);

        let mut conn = self.conn_manager.clone();
        for key in &keys {
            let _: () = conn
                .set_ex(key, bytes.as_slice(), ttl_seconds)
                .await
                .map_err(|e| unavailable("Order record write failed", &e))?;
        }

        tracing::debug!(
            keys = keys.len(),
            transaction_id = merged.transaction_id.as_deref().unwrap_or(""),
            ttl_seconds,
            "Fanned out order record"
        );
        Ok(())
    }
}

impl Clone for RedisOrderRecordStore {
    fn clone(&self) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
            prefix: self.prefix.clone(),
            ttl: self.ttl,
        }
    }
}

impl OrderRecordStore for RedisOrderRecordStore {
    async fn store(&self, record: &OrderRecord) -> Result<()> {
        self.upsert(record).await
    }

    async fn update(&self, record: &OrderRecord) -> Result<()> {
        self.upsert(record).await
    }

    async fn get_by_search_id(&self, search_id: &str) -> Result<OrderRecord> {
        self.get_key(&search_key(&self.prefix, search_id)).await
    }

    async fn get_by_quote_id(&self, quote_id: &str) -> Result<OrderRecord> {
        self.get_key(&quote_key(&self.prefix, quote_id)).await
    }

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<OrderRecord> {
        self.get_key(&transaction_key(&self.prefix, transaction_id))
            .await
    }

    async fn get_by_order_id(&self, client_id: &str, order_id: &str) -> Result<OrderRecord> {
        self.get_key(&order_key(&self.prefix, client_id, order_id))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use uuid::Uuid;

    fn unique_ids() -> (String, String, String) {
        let tag = Uuid::new_v4();
        (
            format!("s-{tag}"),
            format!("client-{tag}"),
            format!("txn-{tag}"),
        )
    }

    #[tokio::test]
    #[ignore] // Requires Redis running at localhost:6379
    async fn record_is_reachable_by_every_key_after_update() {
        let manager = crate::connect("redis://127.0.0.1:6379").await.unwrap();
        let store = RedisOrderRecordStore::new(manager, "test", Duration::from_secs(60));

        let (search_id, client_id, transaction_id) = unique_ids();
        let record = OrderRecord::started(&search_id, &client_id, &transaction_id);
        store.store(&record).await.unwrap();

        // Enrich with a quote through a different key.
        let update = OrderRecord {
            transaction_id: Some(transaction_id.clone()),
            quote_id: Some("q-1".to_string()),
            ..OrderRecord::default()
        };
        store.update(&update).await.unwrap();

        let by_search = store.get_by_search_id(&search_id).await.unwrap();
        let by_quote = store.get_by_quote_id("q-1").await.unwrap();
        let by_txn = store.get_by_transaction_id(&transaction_id).await.unwrap();

        assert_eq!(by_search, by_quote);
        assert_eq!(by_quote, by_txn);
        assert_eq!(by_txn.search_id.as_deref(), Some(search_id.as_str()));
        assert_eq!(by_txn.quote_id.as_deref(), Some("q-1"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running at localhost:6379
    async fn update_never_overwrites_set_identifiers() {
        let manager = crate::connect("redis://127.0.0.1:6379").await.unwrap();
        let store = RedisOrderRecordStore::new(manager, "test", Duration::from_secs(60));

        let (search_id, client_id, transaction_id) = unique_ids();
        store
            .store(&OrderRecord::started(&search_id, &client_id, &transaction_id))
            .await
            .unwrap();

        let conflicting = OrderRecord {
            transaction_id: Some(transaction_id.clone()),
            search_id: Some("s-CHANGED".to_string()),
            ..OrderRecord::default()
        };
        store.update(&conflicting).await.unwrap();

        let current = store.get_by_transaction_id(&transaction_id).await.unwrap();
        assert_eq!(current.search_id.as_deref(), Some(search_id.as_str()));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running at localhost:6379
    async fn miss_and_corruption_are_distinct() {
        let manager = crate::connect("redis://127.0.0.1:6379").await.unwrap();
        let store =
            RedisOrderRecordStore::new(manager.clone(), "test", Duration::from_secs(60));

        let miss = store.get_by_search_id("never-stored").await.unwrap_err();
        assert!(miss.is_not_found());

        // Plant garbage under a record key.
        let key = search_key("test", "corrupt-target");
        let mut conn = manager;
        let _: () = conn.set_ex(&key, "not json", 60).await.unwrap();

        let corrupt = store.get_by_search_id("corrupt-target").await.unwrap_err();
        assert!(matches!(corrupt, GatewayError::CorruptRecord(_)));
    }
}
