//! # Gateway Core
//!
//! Core traits and types for the commerce protocol gateway: the domain
//! records, event envelopes, trait seams for the shared log and key/value
//! stores, the error taxonomy, and configuration.
//!
//! The gateway bridges a synchronous request/callback commerce protocol
//! with an event-driven backend reachable only through shared
//! publish/subscribe logs. This crate holds everything the engines in
//! `gateway-runtime` and the backends in `gateway-redis` agree on.
//!
//! ## Architecture
//!
//! ```text
//! handler (external)
//!    │
//!    ├─► IdempotencyStore.check ──► replay stored bytes, or:
//!    ├─► OrderRecordStore lookup/update
//!    ├─► EventCorrelator.publish(request event)
//!    ├─► EventCorrelator.consume(result event, bounded by TTL)
//!    └─► (async) CallbackDeliveryEngine.send_with_retry, signed by
//!        TrustService
//! ```
//!
//! No business logic lives here: the gateway correlates with downstream
//! services, it never computes quotes or orders itself.

/// Gateway configuration knobs.
pub mod config;

/// Error taxonomy shared by every component.
pub mod error;

/// Event envelopes and business-identifier matching.
pub mod event;

/// Event log trait seam.
pub mod log;

/// The order record and its lookup-key derivation.
pub mod record;

/// Store and key-registry trait seams.
pub mod stores;

pub use config::{ConsumeStrategy, GatewayConfig};
pub use error::{GatewayError, Result};
pub use event::{EnvelopeIds, EventEnvelope};
pub use log::{EventLog, RawMessage};
pub use record::OrderRecord;
pub use stores::{IdempotencyStore, KeyRegistry, OrderRecordStore, idempotency_key};
