//! Deterministic in-memory backends for gateway tests.
//!
//! Everything here implements the storage traits from `gateway-core`
//! without I/O, so correlation, trust and delivery logic can be tested
//! under tokio's paused clock. None of these types belong in production:
//! they keep unbounded state and a single process's view of it.

pub mod event_log;
pub mod registry;
pub mod stores;

pub use event_log::InMemoryEventLog;
pub use registry::StaticKeyRegistry;
pub use stores::{InMemoryIdempotencyStore, InMemoryOrderRecordStore};
