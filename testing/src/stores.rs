//! In-memory store backends.

use crate::event_log::lock;
use gateway_core::record::{order_key, quote_key, search_key, transaction_key};
use gateway_core::{GatewayError, IdempotencyStore, OrderRecord, OrderRecordStore, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Key namespace used by the in-memory stores. Tests never see the keys,
/// so one fixed prefix suffices.
const PREFIX: &str = "mem";

/// In-memory [`IdempotencyStore`] with real TTL expiry.
///
/// Expiry uses the tokio clock, so paused-time tests can advance past it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<Mutex<HashMap<String, (Vec<u8>, Instant)>>>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = lock(&self.entries);
        Ok(entries.get(key).and_then(|(bytes, expires_at)| {
            if Instant::now() < *expires_at {
                Some(bytes.clone())
            } else {
                None
            }
        }))
    }

    async fn store(&self, key: &str, response: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), (response.to_vec(), Instant::now() + ttl));
        Ok(())
    }
}

/// In-memory [`OrderRecordStore`] with the same merge and multi-key
/// semantics as the Redis backend: writes merge into the existing snapshot
/// (set identifiers win) and fan out under every lookup key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRecordStore {
    records: Arc<Mutex<HashMap<String, OrderRecord>>>,
}

impl InMemoryOrderRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_key(&self, key: &str) -> Result<OrderRecord> {
        lock(&self.records)
            .get(key)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    fn upsert(&self, record: &OrderRecord) -> Result<()> {
        let mut records = lock(&self.records);

        let mut merged = record.clone();
        let existing = record
            .lookup_keys(PREFIX)
            .into_iter()
            .find_map(|key| records.get(&key).cloned());
        if let Some(existing) = existing {
            merged.merge_from(&existing);
        }

        let keys = merged.lookup_keys(PREFIX);
        if keys.is_empty() {
            return Err(GatewayError::Serialization(
                "Order record has no lookup identifiers".to_string(),
            ));
        }
        for key in keys {
            records.insert(key, merged.clone());
        }
        Ok(())
    }
}

impl OrderRecordStore for InMemoryOrderRecordStore {
    async fn store(&self, record: &OrderRecord) -> Result<()> {
        self.upsert(record)
    }

    async fn update(&self, record: &OrderRecord) -> Result<()> {
        self.upsert(record)
    }

    async fn get_by_search_id(&self, search_id: &str) -> Result<OrderRecord> {
        self.get_key(&search_key(PREFIX, search_id))
    }

    async fn get_by_quote_id(&self, quote_id: &str) -> Result<OrderRecord> {
        self.get_key(&quote_key(PREFIX, quote_id))
    }

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<OrderRecord> {
        self.get_key(&transaction_key(PREFIX, transaction_id))
    }

    async fn get_by_order_id(&self, client_id: &str, order_id: &str) -> Result<OrderRecord> {
        self.get_key(&order_key(PREFIX, client_id, order_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[tokio::test]
    async fn idempotency_round_trips_bytes_verbatim() {
        let store = InMemoryIdempotencyStore::new();
        // Deliberately not valid JSON/UTF-8: the store must not care.
        let response = [0x7b_u8, 0xff, 0x00, 0x22, 0x9c];

        assert!(store.check("confirm:txn-1:msg-9").await.unwrap().is_none());

        store
            .store("confirm:txn-1:msg-9", &response, Duration::from_secs(60))
            .await
            .unwrap();

        let replayed = store.check("confirm:txn-1:msg-9").await.unwrap().unwrap();
        assert_eq!(replayed, response);
    }

    #[tokio::test(start_paused = true)]
    async fn idempotency_entry_expires() {
        let store = InMemoryIdempotencyStore::new();
        store
            .store("confirm:txn-1:msg-1", b"response", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.check("confirm:txn-1:msg-1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.check("confirm:txn-1:msg-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn order_record_merges_and_fans_out() {
        let store = InMemoryOrderRecordStore::new();
        store
            .store(&OrderRecord::started("s-1", "client-1", "txn-1"))
            .await
            .unwrap();

        let update = OrderRecord {
            transaction_id: Some("txn-1".to_string()),
            quote_id: Some("q-1".to_string()),
            search_id: Some("s-CHANGED".to_string()),
            ..OrderRecord::default()
        };
        store.update(&update).await.unwrap();

        let by_quote = store.get_by_quote_id("q-1").await.unwrap();
        // Set identifiers win over the incoming update.
        assert_eq!(by_quote.search_id.as_deref(), Some("s-1"));
        assert_eq!(by_quote, store.get_by_transaction_id("txn-1").await.unwrap());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = InMemoryOrderRecordStore::new();
        assert!(store.get_by_search_id("nope").await.unwrap_err().is_not_found());
    }
}
