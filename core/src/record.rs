//! The order record: the unit of cross-action correlation.
//!
//! One logical order flow accumulates five independently generated
//! identifiers as it moves through the protocol (search, quote, order,
//! transaction, dispatch). None of them is derived from another, so the
//! record must be reachable by any of its four lookup keys, and every
//! write refreshes all of them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key segment shared by every order-record key.
const RECORD_SEGMENT: &str = "order_record";

/// Correlation record for one logical order flow.
///
/// # Invariants
///
/// - No identifier is computed from another; each is generated by whichever
///   party owns that protocol step.
/// - An identifier, once set, is never overwritten — later writes only fill
///   fields that are still empty (see [`merge_from`](Self::merge_from)).
/// - The fulfillment identifier is generated once and reused verbatim in
///   every subsequent callback for this order.
///
/// # Lifecycle
///
/// Created on the first protocol step with `search_id`, `client_id` and
/// `transaction_id`; enriched with `quote_id` and `fulfillment_id`, then
/// `dispatch_order_id` and `order_id`. Expires via the store TTL, refreshed
/// on every update; never explicitly deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Search identifier, set on the first protocol step.
    #[serde(default)]
    pub search_id: Option<String>,

    /// Quote identifier, set when a quote is produced.
    #[serde(default)]
    pub quote_id: Option<String>,

    /// Identifier assigned by the dispatch system.
    #[serde(default)]
    pub dispatch_order_id: Option<String>,

    /// Order identifier assigned at confirmation.
    #[serde(default)]
    pub order_id: Option<String>,

    /// Caller (tenant) identifier; scopes the order-id lookup key.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Protocol transaction identifier.
    #[serde(default)]
    pub transaction_id: Option<String>,

    /// Gateway-generated fulfillment identifier, stable once set.
    #[serde(default)]
    pub fulfillment_id: Option<String>,
}

fn is_set(field: Option<&str>) -> bool {
    field.is_some_and(|v| !v.is_empty())
}

impl OrderRecord {
    /// Create the record for a new order flow.
    #[must_use]
    pub fn started(
        search_id: impl Into<String>,
        client_id: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            search_id: Some(search_id.into()),
            client_id: Some(client_id.into()),
            transaction_id: Some(transaction_id.into()),
            ..Self::default()
        }
    }

    /// Carry forward every identifier already set on `existing`.
    ///
    /// Fields that are non-empty on `existing` win over this record's
    /// values; this record only contributes fields that were still empty.
    /// This is what makes writes additive and keeps identifiers from ever
    /// being overwritten.
    pub fn merge_from(&mut self, existing: &Self) {
        let fields = [
            (&mut self.search_id, &existing.search_id),
            (&mut self.quote_id, &existing.quote_id),
            (&mut self.dispatch_order_id, &existing.dispatch_order_id),
            (&mut self.order_id, &existing.order_id),
            (&mut self.client_id, &existing.client_id),
            (&mut self.transaction_id, &existing.transaction_id),
            (&mut self.fulfillment_id, &existing.fulfillment_id),
        ];
        for (mine, theirs) in fields {
            if is_set(theirs.as_deref()) {
                mine.clone_from(theirs);
            }
        }
    }

    /// Return the fulfillment identifier, generating it on first use.
    ///
    /// Once generated the value is stable: every later call (and every
    /// callback referencing this order) sees the same identifier.
    pub fn ensure_fulfillment_id(&mut self) -> &str {
        if !is_set(self.fulfillment_id.as_deref()) {
            self.fulfillment_id = Some(Uuid::new_v4().to_string());
        }
        // Just assigned above when it was empty.
        self.fulfillment_id.as_deref().unwrap_or_default()
    }

    /// All lookup keys this record is currently reachable by.
    ///
    /// Up to four keys, one per non-empty identifier. The order-id key is
    /// composite (`client_id` + `order_id`) so identifiers from different
    /// tenants never collide.
    #[must_use]
    pub fn lookup_keys(&self, prefix: &str) -> Vec<String> {
        let mut keys = Vec::with_capacity(4);
        if let Some(id) = self.search_id.as_deref().filter(|v| !v.is_empty()) {
            keys.push(search_key(prefix, id));
        }
        if let Some(id) = self.quote_id.as_deref().filter(|v| !v.is_empty()) {
            keys.push(quote_key(prefix, id));
        }
        if let Some(id) = self.transaction_id.as_deref().filter(|v| !v.is_empty()) {
            keys.push(transaction_key(prefix, id));
        }
        if let (Some(client), Some(order)) = (
            self.client_id.as_deref().filter(|v| !v.is_empty()),
            self.order_id.as_deref().filter(|v| !v.is_empty()),
        ) {
            keys.push(order_key(prefix, client, order));
        }
        keys
    }
}

/// Lookup key for a search identifier.
#[must_use]
pub fn search_key(prefix: &str, search_id: &str) -> String {
    format!("{prefix}:{RECORD_SEGMENT}:search_id:{search_id}")
}

/// Lookup key for a quote identifier.
#[must_use]
pub fn quote_key(prefix: &str, quote_id: &str) -> String {
    format!("{prefix}:{RECORD_SEGMENT}:quote_id:{quote_id}")
}

/// Lookup key for a transaction identifier.
#[must_use]
pub fn transaction_key(prefix: &str, transaction_id: &str) -> String {
    format!("{prefix}:{RECORD_SEGMENT}:transaction_id:{transaction_id}")
}

/// Composite lookup key for an order identifier, scoped per tenant.
#[must_use]
pub fn order_key(prefix: &str, client_id: &str, order_id: &str) -> String {
    format!("{prefix}:{RECORD_SEGMENT}:order_id:{client_id}:{order_id}")
}
