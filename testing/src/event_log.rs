//! Deterministic in-memory event log.

use gateway_core::{EventEnvelope, EventLog, RawMessage, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Poll interval while a read is blocked on an empty stream. Short enough
/// that paused-clock tests advance through it instantly.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct StoredMessage {
    id: String,
    body: Vec<u8>,
    /// Claimed messages are invisible to readers until released or acked.
    claimed: bool,
}

#[derive(Debug, Default)]
struct StreamState {
    next_id: u64,
    messages: Vec<StoredMessage>,
}

/// In-memory [`EventLog`] with single-group consumer semantics.
///
/// Messages keep their publish order; a released message reappears at its
/// original position, so stream order is preserved exactly as the trait
/// requires. Clones share state, standing in for multiple gateway
/// instances on one log.
///
/// The `group` argument is accepted and ignored: tests exercise a single
/// shared group, which is also how the gateway deploys.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLog {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
}

impl InMemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish raw bytes, bypassing envelope encoding.
    ///
    /// For poison-message tests that need undecodable bodies on a stream.
    pub fn publish_raw(&self, stream: &str, body: Vec<u8>) {
        let mut streams = lock(&self.streams);
        let state = streams.entry(stream.to_string()).or_default();
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        state.messages.push(StoredMessage {
            id,
            body,
            claimed: false,
        });
    }

    /// Number of messages currently on a stream, claimed ones included.
    #[must_use]
    pub fn len(&self, stream: &str) -> usize {
        lock(&self.streams)
            .get(stream)
            .map_or(0, |state| state.messages.len())
    }

    /// Whether a stream holds no messages.
    #[must_use]
    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    fn try_claim(&self, stream: &str) -> Option<RawMessage> {
        let mut streams = lock(&self.streams);
        let state = streams.get_mut(stream)?;
        let message = state.messages.iter_mut().find(|m| !m.claimed)?;
        message.claimed = true;
        Some(RawMessage {
            id: message.id.clone(),
            body: message.body.clone(),
        })
    }
}

impl EventLog for InMemoryEventLog {
    async fn publish(&self, stream: &str, envelope: &EventEnvelope) -> Result<()> {
        self.publish_raw(stream, envelope.to_bytes()?);
        Ok(())
    }

    async fn read_one(
        &self,
        stream: &str,
        _group: &str,
        block: Duration,
    ) -> Result<Option<RawMessage>> {
        let deadline = Instant::now() + block;
        loop {
            if let Some(message) = self.try_claim(stream) {
                return Ok(Some(message));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn ack(&self, stream: &str, _group: &str, message_id: &str) -> Result<()> {
        let mut streams = lock(&self.streams);
        if let Some(state) = streams.get_mut(stream) {
            state.messages.retain(|m| m.id != message_id);
        }
        Ok(())
    }

    async fn release(&self, stream: &str, _group: &str, message_id: &str) -> Result<()> {
        let mut streams = lock(&self.streams);
        if let Some(state) = streams.get_mut(stream) {
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
                message.claimed = false;
            }
        }
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Lock holders never panic; recover the guard rather than poisoning
    // every test that follows.
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    fn envelope(transaction_id: &str) -> EventEnvelope {
        EventEnvelope::new("test.event".to_string(), serde_json::json!({}))
            .with_transaction_id(transaction_id)
    }

    const BLOCK: Duration = Duration::from_millis(10);

    #[tokio::test(start_paused = true)]
    async fn claimed_message_is_invisible_until_released() {
        let log = InMemoryEventLog::new();
        log.publish("s", &envelope("txn-1")).await.unwrap();

        let first = log.read_one("s", "g", BLOCK).await.unwrap().unwrap();
        assert!(log.read_one("s", "g", BLOCK).await.unwrap().is_none());

        log.release("s", "g", &first.id).await.unwrap();
        let again = log.read_one("s", "g", BLOCK).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test(start_paused = true)]
    async fn release_preserves_publish_order() {
        let log = InMemoryEventLog::new();
        log.publish("s", &envelope("txn-1")).await.unwrap();
        log.publish("s", &envelope("txn-2")).await.unwrap();

        let first = log.read_one("s", "g", BLOCK).await.unwrap().unwrap();
        log.release("s", "g", &first.id).await.unwrap();

        // The released message comes back before the later one.
        let next = log.read_one("s", "g", BLOCK).await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_removes_for_every_clone() {
        let log = InMemoryEventLog::new();
        let other = log.clone();
        log.publish("s", &envelope("txn-1")).await.unwrap();

        let message = log.read_one("s", "g", BLOCK).await.unwrap().unwrap();
        log.ack("s", "g", &message.id).await.unwrap();

        assert!(other.is_empty("s"));
        assert!(other.read_one("s", "g", BLOCK).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_read_wakes_on_publish() {
        let log = InMemoryEventLog::new();
        let reader = {
            let log = log.clone();
            tokio::spawn(async move { log.read_one("s", "g", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        log.publish("s", &envelope("txn-1")).await.unwrap();

        assert!(reader.await.unwrap().unwrap().is_some());
    }
}
