//! # Gateway Redis
//!
//! Redis-backed implementations of the `gateway-core` trait seams:
//!
//! - [`RedisEventLog`] — the shared publish/subscribe log, on Redis Streams
//!   with consumer groups
//! - [`RedisIdempotencyStore`] — byte-verbatim response replay with TTL
//! - [`RedisOrderRecordStore`] — four-key fan-out correlation records
//!
//! All three share one [`ConnectionManager`] (connection pooling); clones
//! are cheap and share the pool. Blocking stream reads are the exception —
//! they run on dedicated connections so a bounded wait can never stall
//! unrelated commands multiplexed on the shared manager.

use gateway_core::{GatewayError, Result};
use redis::Client;
use redis::aio::ConnectionManager;

/// Event log on Redis Streams.
pub mod event_log;

/// Idempotent response replay store.
pub mod idempotency;

/// Order-record correlation store.
pub mod order_record;

pub use event_log::RedisEventLog;
pub use idempotency::RedisIdempotencyStore;
pub use order_record::RedisOrderRecordStore;

/// Open a pooled connection manager for the store implementations.
///
/// # Connection URL Format
///
/// - TCP: `redis://[:password@]host[:port][/database]`
/// - TLS: `rediss://[:password@]host[:port][/database]`
///
/// # Errors
///
/// Returns [`GatewayError::Unavailable`] if the URL is malformed or the
/// server cannot be reached.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url)
        .map_err(|e| GatewayError::Unavailable(format!("Failed to create Redis client: {e}")))?;

    let manager = ConnectionManager::new(client).await.map_err(|e| {
        GatewayError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
    })?;

    tracing::info!("Redis connection manager initialized");

    Ok(manager)
}

pub(crate) fn unavailable(context: &str, err: &redis::RedisError) -> GatewayError {
    GatewayError::Unavailable(format!("{context}: {err}"))
}
