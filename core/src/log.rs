//! Event log abstraction for the shared publish/subscribe substrate.
//!
//! The gateway never implements log storage itself; it speaks a small
//! client-side protocol against any log with consumer-group semantics:
//! publish an envelope, read at most one message, then either acknowledge
//! it (commit, at-most-once) or release it back for other waiters.
//!
//! # Implementations
//!
//! - `RedisEventLog` in `gateway-redis` — Redis Streams, for production
//! - `InMemoryEventLog` in `gateway-testing` — deterministic, for tests
//!
//! # Delivery Semantics
//!
//! Acknowledging transfers ownership of the message to the caller. This is
//! an at-most-once commit: a caller that crashes after `ack` but before
//! acting on the message has lost the event. Released messages stay
//! available, in original order, to every other consumer of the same group.

use crate::error::Result;
use crate::event::EventEnvelope;
use std::future::Future;
use std::time::Duration;

/// An undecoded message read from a stream.
///
/// The body is the envelope's wire bytes; callers decode as little of it
/// as they need (see `EnvelopeIds`).
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Log-assigned message identifier, used for `ack`/`release`.
    pub id: String,
    /// Envelope wire bytes.
    pub body: Vec<u8>,
}

/// Client-side protocol against a shared, ordered, consumer-grouped log.
///
/// All methods take the stream name explicitly: one stream per event type
/// by convention, with a single consumer group shared across all gateway
/// instances.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single log value is shared by
/// every in-flight request.
pub trait EventLog: Send + Sync {
    /// Publish an envelope to a named stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the log transport
    /// fails, or [`crate::GatewayError::Serialization`] if the envelope
    /// cannot be encoded.
    fn publish(
        &self,
        stream: &str,
        envelope: &EventEnvelope,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read at most one message, blocking up to `block`.
    ///
    /// Returns `Ok(None)` when the wait elapses with nothing to read.
    /// A returned message is *claimed* by this reader until it is either
    /// acknowledged or released.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the log transport
    /// fails.
    fn read_one(
        &self,
        stream: &str,
        group: &str,
        block: Duration,
    ) -> impl Future<Output = Result<Option<RawMessage>>> + Send;

    /// Acknowledge a message, committing it to this consumer.
    ///
    /// After `ack` the message is gone for every member of the group.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the log transport
    /// fails.
    fn ack(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release a claimed message without consuming it.
    ///
    /// The message must become readable again by other consumers of the
    /// same group, preserving original stream order relative to other
    /// released messages.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Unavailable`] if the log transport
    /// fails.
    fn release(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
