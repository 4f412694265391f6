//! Request/response correlation over shared event streams.
//!
//! Protocol responses arrive asynchronously on streams shared by every
//! in-flight request. The correlator lets a waiter publish its request and
//! then consume from a result stream *selectively*: messages that carry the
//! waiter's business identifier are claimed and returned; everything else
//! is put back for the waiter it belongs to.
//!
//! A waiter is identified by one `business_id` string, matched against all
//! of an envelope's identifier fields. Filtering decodes only the envelope
//! identifiers (`EnvelopeIds`); payloads of other waiters' messages are
//! never parsed.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use gateway_core::{ConsumeStrategy, EnvelopeIds, EventEnvelope, EventLog, GatewayError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single blocking read inside the wait loop. Short enough
/// that releases by other consumers are picked up promptly.
const MAX_READ_BLOCK: Duration = Duration::from_secs(1);

/// Pause after reading a non-matching or absent message, so a waiter does
/// not spin against a stream that currently holds only other waiters'
/// messages.
const IDLE_PAUSE: Duration = Duration::from_millis(25);

/// Selective publish/consume over an [`EventLog`].
///
/// Cheap to clone when `L` is; every in-flight request holds one.
#[derive(Debug, Clone)]
pub struct EventCorrelator<L> {
    log: L,
    group: String,
    strategy: ConsumeStrategy,
}

impl<L: EventLog> EventCorrelator<L> {
    /// Create a correlator consuming as a member of `group`.
    pub fn new(log: L, group: impl Into<String>) -> Self {
        Self {
            log,
            group: group.into(),
            strategy: ConsumeStrategy::default(),
        }
    }

    /// Set the dual-stream consume strategy (see [`ConsumeStrategy`]).
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConsumeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Publish an envelope to a stream.
    ///
    /// # Errors
    ///
    /// Propagates [`GatewayError::Unavailable`] and
    /// [`GatewayError::Serialization`] from the log.
    pub async fn publish(&self, stream: &str, envelope: &EventEnvelope) -> Result<()> {
        self.log.publish(stream, envelope).await
    }

    /// Attempt to consume one matching message, blocking up to `block`.
    ///
    /// Reads a single message and decides:
    ///
    /// - matching: acknowledged and returned
    /// - not matching: released back for its own waiter, `Ok(None)`
    /// - undecodable: acknowledged (removed as poison) and logged, `Ok(None)`
    ///   — garbage from a misbehaving producer must never fail a waiter
    ///   whose own event may be queued right behind it
    /// - nothing read within `block`: `Ok(None)`
    ///
    /// # Errors
    ///
    /// Transport failures propagate as [`GatewayError::Unavailable`].
    pub async fn consume_one(
        &self,
        stream: &str,
        business_id: &str,
        block: Duration,
    ) -> Result<Option<EventEnvelope>> {
        let Some(message) = self.log.read_one(stream, &self.group, block).await? else {
            return Ok(None);
        };

        let ids = match EnvelopeIds::from_bytes(&message.body) {
            Ok(ids) => ids,
            Err(e) => {
                self.discard_poison(stream, &message.id, &e).await?;
                return Ok(None);
            }
        };

        if !ids.matches(business_id) {
            tracing::trace!(stream, message_id = %message.id, "Not ours, releasing");
            self.log.release(stream, &self.group, &message.id).await?;
            return Ok(None);
        }

        let envelope = match EventEnvelope::from_bytes(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.discard_poison(stream, &message.id, &e).await?;
                return Ok(None);
            }
        };

        self.log.ack(stream, &self.group, &message.id).await?;
        tracing::debug!(
            stream,
            message_id = %message.id,
            event_type = %envelope.event_type,
            business_id,
            "Consumed matching event"
        );
        Ok(Some(envelope))
    }

    /// Wait for a matching message until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] when the timeout elapses without
    /// a match, [`GatewayError::Cancelled`] if `cancel` fires first, and
    /// propagates hard errors from [`Self::consume_one`].
    pub async fn consume(
        &self,
        stream: &str,
        business_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EventEnvelope> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(stream, business_id, ?timeout, "Correlation wait timed out");
                return Err(GatewayError::NotFound);
            }

            let block = remaining.min(MAX_READ_BLOCK);
            let consumed = tokio::select! {
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                result = self.consume_one(stream, business_id, block) => result?,
            };

            if let Some(envelope) = consumed {
                return Ok(envelope);
            }

            // The message we just released (or an empty stream) would be
            // re-read immediately; yield before the next pass.
            tokio::select! {
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                () = tokio::time::sleep(IDLE_PAUSE.min(remaining)) => {}
            }
        }
    }

    /// Wait for a matching message on the first of several candidate
    /// streams to produce one.
    ///
    /// Some operations answer on one of two streams (an on-time result
    /// stream and a late/unsolicited one). With
    /// [`ConsumeStrategy::Sequential`] each stream gets a full `timeout` in
    /// order; with [`ConsumeStrategy::SharedDeadline`] all streams race
    /// under one deadline.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`] when no stream produced a match,
    /// otherwise as [`Self::consume`].
    pub async fn consume_first(
        &self,
        streams: &[&str],
        business_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EventEnvelope> {
        match self.strategy {
            ConsumeStrategy::Sequential => {
                for stream in streams {
                    match self.consume(stream, business_id, timeout, cancel).await {
                        Ok(envelope) => return Ok(envelope),
                        Err(GatewayError::NotFound) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(GatewayError::NotFound)
            }
            ConsumeStrategy::SharedDeadline => {
                let mut waits: FuturesUnordered<_> = streams
                    .iter()
                    .map(|stream| self.consume(stream, business_id, timeout, cancel))
                    .collect();

                while let Some(result) = waits.next().await {
                    match result {
                        Ok(envelope) => return Ok(envelope),
                        Err(GatewayError::NotFound) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(GatewayError::NotFound)
            }
        }
    }

    /// Ack an undecodable message so it cannot wedge the group.
    async fn discard_poison(
        &self,
        stream: &str,
        message_id: &str,
        error: &GatewayError,
    ) -> Result<()> {
        tracing::error!(stream, message_id, %error, "Discarding undecodable message");
        self.log.ack(stream, &self.group, message_id).await
    }
}
