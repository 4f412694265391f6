//! Gateway configuration.
//!
//! These knobs are consumed from whatever configuration layer the embedding
//! application uses; the gateway itself never reads files or environment
//! variables. Values should be provided by the application, not hardcoded.

use std::time::Duration;

/// How a waiter consumes from two candidate result streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeStrategy {
    /// One full-timeout wait per stream, in order, stopping at the first
    /// hit. Worst case is roughly twice the nominal timeout.
    #[default]
    Sequential,

    /// All candidate streams polled under one shared deadline, so the
    /// caller never waits longer than the nominal timeout.
    SharedDeadline,
}

/// Tunables for the correlation, trust and delivery engines.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total callback delivery attempts allowed (first try included).
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Backoff table in seconds, indexed by attempt number. When the table
    /// runs out the delay falls back to `min(2^attempt, 30s)`.
    ///
    /// Default: `[1, 2, 4]`
    pub callback_backoff_secs: Vec<u64>,

    /// Per-attempt HTTP timeout for callback delivery.
    ///
    /// Default: 10 seconds
    pub callback_timeout: Duration,

    /// Dead-letter stream for exhausted callbacks. `None` disables
    /// dead-lettering: exhausted payloads are logged and dropped.
    ///
    /// Default: `None`
    pub dead_letter_stream: Option<String>,

    /// Replay window for request timestamps, applied in both directions.
    ///
    /// Default: 30 seconds
    pub timestamp_window: Duration,

    /// Lifetime of an order record, refreshed on every update.
    ///
    /// Default: 24 hours
    pub record_ttl: Duration,

    /// Lifetime of a stored idempotent response.
    ///
    /// Default: 1 hour
    pub idempotency_ttl: Duration,

    /// Namespace prefix for every store key.
    ///
    /// Default: `"gateway"`
    pub key_prefix: String,

    /// Consumer group shared by all correlator instances.
    ///
    /// Default: `"gateway"`
    pub consumer_group: String,

    /// Dual-stream consume strategy (see [`ConsumeStrategy`]).
    pub consume_strategy: ConsumeStrategy,
}

impl GatewayConfig {
    /// Create a configuration with default tunables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            callback_backoff_secs: vec![1, 2, 4],
            callback_timeout: Duration::from_secs(10),
            dead_letter_stream: None,
            timestamp_window: Duration::from_secs(30),
            record_ttl: Duration::from_secs(24 * 60 * 60),
            idempotency_ttl: Duration::from_secs(60 * 60),
            key_prefix: "gateway".to_string(),
            consumer_group: "gateway".to_string(),
            consume_strategy: ConsumeStrategy::default(),
        }
    }

    /// Set the total callback attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff table (seconds, indexed by attempt).
    #[must_use]
    pub fn with_backoff_secs(mut self, table: Vec<u64>) -> Self {
        self.callback_backoff_secs = table;
        self
    }

    /// Set the per-attempt callback HTTP timeout.
    #[must_use]
    pub const fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Enable dead-lettering to the given stream.
    #[must_use]
    pub fn with_dead_letter_stream(mut self, stream: impl Into<String>) -> Self {
        self.dead_letter_stream = Some(stream.into());
        self
    }

    /// Set the replay window for request timestamps.
    #[must_use]
    pub const fn with_timestamp_window(mut self, window: Duration) -> Self {
        self.timestamp_window = window;
        self
    }

    /// Set the order-record lifetime.
    #[must_use]
    pub const fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Set the idempotent-response lifetime.
    #[must_use]
    pub const fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    /// Set the store key namespace.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the shared consumer group name.
    #[must_use]
    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    /// Set the dual-stream consume strategy.
    #[must_use]
    pub const fn with_consume_strategy(mut self, strategy: ConsumeStrategy) -> Self {
        self.consume_strategy = strategy;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = GatewayConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.callback_backoff_secs, vec![1, 2, 4]);
        assert!(config.dead_letter_stream.is_none());
        assert_eq!(config.consume_strategy, ConsumeStrategy::Sequential);
    }

    #[test]
    fn builder_chain() {
        let config = GatewayConfig::new()
            .with_max_retries(5)
            .with_backoff_secs(vec![2, 4])
            .with_dead_letter_stream("callbacks.dead")
            .with_timestamp_window(Duration::from_secs(60))
            .with_key_prefix("gw")
            .with_consume_strategy(ConsumeStrategy::SharedDeadline);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.callback_backoff_secs, vec![2, 4]);
        assert_eq!(config.dead_letter_stream.as_deref(), Some("callbacks.dead"));
        assert_eq!(config.timestamp_window, Duration::from_secs(60));
        assert_eq!(config.key_prefix, "gw");
        assert_eq!(config.consume_strategy, ConsumeStrategy::SharedDeadline);
    }
}
