//! Event envelope types for correlated publish/consume.
//!
//! Every message on a gateway stream is an [`EventEnvelope`]: a typed payload
//! plus the business identifiers that tie it to one logical order flow.
//! Waiters filter a shared stream by business identifier, so the envelope
//! separates the cheap-to-decode identifier fields from the payload.
//!
//! Envelopes are JSON on the wire. Payloads are `serde_json::Value`, so a
//! binary codec would buy nothing and JSON keeps the stream inspectable.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// A typed event plus the business identifiers used for correlation.
///
/// Identifier fields are optional: a search request carries only a
/// `transaction_id` and `search_id`, while an order confirmation carries an
/// `order_id` as well. Transport-level IDs (tracing, dedup) never appear
/// here — they must not affect correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Stable event type identifier (e.g. `"search.request"`).
    pub event_type: String,

    /// Search identifier, when this event belongs to a search flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,

    /// Quote identifier, when this event belongs to a quote flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,

    /// Order identifier, when this event belongs to a confirmed order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// Protocol transaction identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Opaque event payload. Never inspected by the correlator.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Create an envelope with no business identifiers set.
    #[must_use]
    pub const fn new(event_type: String, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            search_id: None,
            quote_id: None,
            order_id: None,
            transaction_id: None,
            payload,
        }
    }

    /// Set the search identifier.
    #[must_use]
    pub fn with_search_id(mut self, id: impl Into<String>) -> Self {
        self.search_id = Some(id.into());
        self
    }

    /// Set the quote identifier.
    #[must_use]
    pub fn with_quote_id(mut self, id: impl Into<String>) -> Self {
        self.quote_id = Some(id.into());
        self
    }

    /// Set the order identifier.
    #[must_use]
    pub fn with_order_id(mut self, id: impl Into<String>) -> Self {
        self.order_id = Some(id.into());
        self
    }

    /// Set the transaction identifier.
    #[must_use]
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    /// Whether this event belongs to the waiter identified by `business_id`.
    ///
    /// An empty `business_id` matches every event. This permissive mode is
    /// intentionally unsafe — it lets a waiter steal unrelated events from a
    /// shared stream — and is not recommended outside of single-tenant
    /// debugging.
    #[must_use]
    pub fn matches(&self, business_id: &str) -> bool {
        ids_match(
            business_id,
            [
                self.search_id.as_deref(),
                self.quote_id.as_deref(),
                self.order_id.as_deref(),
                self.transaction_id.as_deref(),
            ],
        )
    }

    /// Encode this envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if the payload cannot be
    /// encoded (non-string map keys and similar).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    /// Decode an envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CorruptRecord`] if the bytes are not a valid
    /// envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::CorruptRecord(e.to_string()))
    }
}

/// The identifier fields of an envelope, without the payload.
///
/// The correlator decodes only this far when deciding whether a consumed
/// message belongs to the current waiter; non-matching payloads are never
/// parsed. Unknown JSON fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeIds {
    /// Search identifier, if present.
    #[serde(default)]
    pub search_id: Option<String>,
    /// Quote identifier, if present.
    #[serde(default)]
    pub quote_id: Option<String>,
    /// Order identifier, if present.
    #[serde(default)]
    pub order_id: Option<String>,
    /// Transaction identifier, if present.
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl EnvelopeIds {
    /// Decode just the identifier fields from envelope wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CorruptRecord`] if the bytes are not JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::CorruptRecord(e.to_string()))
    }

    /// Whether any identifier field equals `business_id`, or `business_id`
    /// is empty (permissive mode, see [`EventEnvelope::matches`]).
    #[must_use]
    pub fn matches(&self, business_id: &str) -> bool {
        ids_match(
            business_id,
            [
                self.search_id.as_deref(),
                self.quote_id.as_deref(),
                self.order_id.as_deref(),
                self.transaction_id.as_deref(),
            ],
        )
    }
}

fn ids_match(business_id: &str, ids: [Option<&str>; 4]) -> bool {
    if business_id.is_empty() {
        return true;
    }
    ids.iter().any(|id| *id == Some(business_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new(
            "quote.result".to_string(),
            serde_json::json!({"total": "129.00"}),
        )
        .with_transaction_id("txn-1")
        .with_quote_id("quote-9")
    }

    #[test]
    fn matches_on_any_identifier_field() {
        let event = envelope();
        assert!(event.matches("txn-1"));
        assert!(event.matches("quote-9"));
        assert!(!event.matches("txn-2"));
        assert!(!event.matches("quote"));
    }

    #[test]
    fn empty_business_id_matches_everything() {
        assert!(envelope().matches(""));
        assert!(EnvelopeIds::default().matches(""));
    }

    #[test]
    fn partial_decode_sees_only_identifiers() {
        let bytes = envelope().to_bytes().unwrap();
        let ids = EnvelopeIds::from_bytes(&bytes).unwrap();
        assert_eq!(ids.transaction_id.as_deref(), Some("txn-1"));
        assert_eq!(ids.quote_id.as_deref(), Some("quote-9"));
        assert!(ids.search_id.is_none());
        assert!(ids.matches("txn-1"));
        assert!(!ids.matches("other"));
    }

    #[test]
    fn wire_round_trip_preserves_payload() {
        let event = envelope();
        let decoded = EventEnvelope::from_bytes(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn garbage_bytes_are_corrupt() {
        let err = EventEnvelope::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, GatewayError::CorruptRecord(_)));
    }
}
