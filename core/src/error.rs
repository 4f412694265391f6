//! Error taxonomy for gateway operations.
//!
//! Stores and the correlator return these typed errors to the handler layer,
//! which decides the user-facing status. The delivery engine owns its own
//! retry loop and only ever surfaces the final exhausted-or-success outcome.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error taxonomy shared by every gateway component.
///
/// The variants map one-to-one onto how callers must react:
/// misses are normal business conditions, corruption and transport
/// failures are internal, and authentication failures are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The requested value does not exist: an idempotency miss, an
    /// order-record miss, or a correlated consume that hit its deadline
    /// without a matching event. Recoverable; surfaced to the caller as a
    /// normal business-level rejection.
    #[error("Not found")]
    NotFound,

    /// A stored record exists but could not be deserialized. Internal,
    /// not retried automatically.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The log or store transport failed. Surfaced as an internal error;
    /// no automatic retry inside the store/correlator layer itself.
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    /// Signature, header-shape, algorithm, or timestamp validation failed.
    /// Always rejected, never retried.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Callback delivery retries are exhausted. Terminal; triggers
    /// dead-letter routing when configured.
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    DeliveryExhausted {
        /// Number of attempts performed.
        attempts: u32,
        /// The last underlying delivery error.
        last_error: String,
    },

    /// The caller cancelled an in-flight wait or backoff sleep.
    #[error("Operation cancelled")]
    Cancelled,

    /// Missing key material or subscriber identity at startup. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An envelope or record failed to encode.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    /// Returns `true` if this error is a normal miss rather than a failure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use gateway_core::GatewayError;
    /// assert!(GatewayError::NotFound.is_not_found());
    /// assert!(!GatewayError::Cancelled.is_not_found());
    /// ```
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` if retrying the operation could plausibly succeed.
    ///
    /// Only transport-level failures qualify; authentication and
    /// corruption errors are terminal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
