//! Correlation, trust and callback delivery engines for the commerce
//! protocol gateway.
//!
//! This crate holds the gateway's moving parts, all generic over the
//! storage traits in `gateway-core`:
//!
//! - [`correlator`] — selective consume of shared result streams
//! - [`trust`] — Ed25519 signing, verification and replay defense
//! - [`delivery`] — signed callback POSTs with retry and dead-lettering
//! - [`backoff`] — the retry delay schedule
//!
//! Production backends live in `gateway-redis`; deterministic in-memory
//! backends for tests live in `gateway-testing`.

pub mod backoff;
pub mod correlator;
pub mod delivery;
pub mod trust;

pub use backoff::backoff_delay;
pub use correlator::EventCorrelator;
pub use delivery::{CallbackDeliveryEngine, CallbackHeaders, CallbackTransport, HttpCallbackTransport};
pub use trust::{ParsedSignature, SignatureContext, TrustService, digest_header, parse_authorization};
