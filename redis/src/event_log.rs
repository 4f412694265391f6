//! Redis Streams implementation of the shared event log.
//!
//! # Architecture
//!
//! Each event type gets its own stream; all gateway instances read through
//! a single shared consumer group. Every log value registers a unique
//! consumer name, so concurrently in-flight waiters are distinct consumers
//! of the same group.
//!
//! Reading one message is a two-step probe:
//!
//! 1. `XAUTOCLAIM` — adopt a pending entry another waiter examined and
//!    released (idle at least the claim threshold).
//! 2. `XREADGROUP … BLOCK … COUNT 1 >` — otherwise wait for a new entry.
//!
//! # Delivery Semantics
//!
//! `ack` is `XACK`: an at-most-once commit that removes the entry from the
//! group. `release` is deliberately a no-op — the entry stays in this
//! consumer's pending list and becomes reclaimable by any other consumer
//! once the claim-idle threshold passes. That is how "leave non-matching
//! events for other waiters, in original order" maps onto consumer-group
//! semantics without re-publishing.
//!
//! Blocking reads run on a dedicated connection per wait. `BLOCK` on the
//! shared multiplexed manager would stall every other command for the
//! duration of the wait.

use gateway_core::{EventEnvelope, EventLog, GatewayError, RawMessage, Result};
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::unavailable;

/// Stream field holding the envelope wire bytes.
const ENVELOPE_FIELD: &str = "envelope";

/// Default idle time before a released entry may be claimed by another
/// waiter.
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(1);

/// Shared event log on Redis Streams.
///
/// # Thread Safety
///
/// `Clone` shares the pooled manager and the group cache but keeps the
/// unique consumer name, so clones still count as one consumer.
pub struct RedisEventLog {
    /// Pooled connection for publish/ack traffic.
    conn_manager: ConnectionManager,
    /// Client for opening dedicated blocking-read connections.
    client: Client,
    /// Unique consumer name for this log instance.
    consumer: String,
    /// Idle threshold before released entries are reclaimed.
    claim_idle: Duration,
    /// `(stream, group)` pairs already created, to skip redundant XGROUP calls.
    known_groups: Arc<Mutex<HashSet<(String, String)>>>,
}

impl RedisEventLog {
    /// Create an event log against the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the URL is malformed or the
    /// server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            GatewayError::Unavailable(format!("Failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| unavailable("Failed to create Redis connection manager", &e))?;

        let consumer = format!("gateway-{}", Uuid::new_v4());
        tracing::info!(consumer = %consumer, "RedisEventLog initialized");

        Ok(Self {
            conn_manager,
            client,
            consumer,
            claim_idle: DEFAULT_CLAIM_IDLE,
            known_groups: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Override the claim-idle threshold (mainly for tests).
    #[must_use]
    pub const fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    /// Consumer name registered by this log instance.
    #[must_use]
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Create the consumer group if this instance has not done so yet.
    ///
    /// New groups start at `$`: waiters only ever correlate events
    /// published after they registered.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        {
            let known = self.known_groups.lock().await;
            if known.contains(&(stream.to_string(), group.to_string())) {
                return Ok(());
            }
        }

        let mut conn = self.conn_manager.clone();
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "$").await;
        match created {
            Ok(()) => {
                tracing::debug!(stream, group, "Created consumer group");
            }
            // Another instance created it first.
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(unavailable("Failed to create consumer group", &e)),
        }

        self.known_groups
            .lock()
            .await
            .insert((stream.to_string(), group.to_string()));
        Ok(())
    }

    /// Adopt one pending entry released by another waiter, if any is idle
    /// enough.
    async fn claim_released(&self, stream: &str, group: &str) -> Result<Option<RawMessage>> {
        let mut conn = self.conn_manager.clone();
        let options = StreamAutoClaimOptions::default().count(1);
        #[allow(clippy::cast_possible_truncation)]
        let min_idle_ms = self.claim_idle.as_millis() as u64;

        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(stream, group, &self.consumer, min_idle_ms, "0-0", options)
            .await
            .map_err(|e| unavailable("XAUTOCLAIM failed", &e))?;

        for entry in reply.claimed {
            if let Some(message) = decode_entry(stream, &entry)? {
                return Ok(Some(message));
            }
            // Entry without an envelope field; drop it from the group so it
            // cannot be claimed forever.
            let _: i64 = conn
                .xack(stream, group, &[&entry.id])
                .await
                .map_err(|e| unavailable("XACK failed", &e))?;
        }
        Ok(None)
    }
}

impl Clone for RedisEventLog {
    fn clone(&self) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
            client: self.client.clone(),
            consumer: self.consumer.clone(),
            claim_idle: self.claim_idle,
            known_groups: Arc::clone(&self.known_groups),
        }
    }
}

impl EventLog for RedisEventLog {
    async fn publish(&self, stream: &str, envelope: &EventEnvelope) -> Result<()> {
        let body = envelope.to_bytes()?;
        let mut conn = self.conn_manager.clone();

        let id: String = conn
            .xadd(stream, "*", &[(ENVELOPE_FIELD, body)])
            .await
            .map_err(|e| unavailable("XADD failed", &e))?;

        tracing::debug!(
            stream,
            message_id = %id,
            event_type = %envelope.event_type,
            "Published event"
        );
        Ok(())
    }

    async fn read_one(
        &self,
        stream: &str,
        group: &str,
        block: Duration,
    ) -> Result<Option<RawMessage>> {
        self.ensure_group(stream, group).await?;

        // Released entries from other waiters take priority over new ones;
        // they are older stream entries.
        if let Some(message) = self.claim_released(stream, group).await? {
            tracing::trace!(stream, group, message_id = %message.id, "Claimed released entry");
            return Ok(Some(message));
        }

        // Dedicated connection: BLOCK would stall the shared manager.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| unavailable("Failed to open blocking-read connection", &e))?;

        #[allow(clippy::cast_possible_truncation)]
        let block_ms = block.as_millis().max(1) as usize;
        let options = StreamReadOptions::default()
            .group(group, &self.consumer)
            .count(1)
            .block(block_ms);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(|e| unavailable("XREADGROUP failed", &e))?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for key in reply.keys {
            for entry in key.ids {
                if let Some(message) = decode_entry(stream, &entry)? {
                    tracing::trace!(
                        stream,
                        group,
                        message_id = %message.id,
                        "Read new entry"
                    );
                    return Ok(Some(message));
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let acked: i64 = conn
            .xack(stream, group, &[message_id])
            .await
            .map_err(|e| unavailable("XACK failed", &e))?;

        if acked == 0 {
            tracing::warn!(
                stream,
                group,
                message_id,
                "XACK matched no pending entry (already committed?)"
            );
        } else {
            tracing::debug!(stream, group, message_id, "Acknowledged event");
        }
        Ok(())
    }

    async fn release(&self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        // Intentionally no Redis command: the entry stays pending under this
        // consumer and becomes reclaimable via XAUTOCLAIM once it has been
        // idle for the claim threshold.
        tracing::trace!(stream, group, message_id, "Released non-matching entry");
        Ok(())
    }
}

/// Extract the envelope bytes from a stream entry.
fn decode_entry(stream: &str, entry: &StreamId) -> Result<Option<RawMessage>> {
    let Some(value) = entry.map.get(ENVELOPE_FIELD) else {
        tracing::warn!(stream, message_id = %entry.id, "Stream entry has no envelope field");
        return Ok(None);
    };
    let body: Vec<u8> = redis::from_redis_value(value)
        .map_err(|e| GatewayError::CorruptRecord(format!("Unreadable stream entry: {e}")))?;
    Ok(Some(RawMessage {
        id: entry.id.clone(),
        body,
    }))
}
