//! Request/response signing, verification and replay defense.
//!
//! The trust service owns the gateway's Ed25519 keypair and subscriber
//! identity. Outbound payloads are hashed with Blake2b-256 and the *hash*
//! is signed; inbound signatures are verified against counterparty keys
//! resolved from an external registry.
//!
//! # Exact wire bytes
//!
//! Both signing and verification hash the exact bytes that travel on the
//! wire. Re-serializing a payload before hashing breaks verification:
//! whitespace and key-ordering differences change the hash. Callers must
//! pass the untouched body bytes.
//!
//! # Wire format
//!
//! `Authorization` header value:
//!
//! ```text
//! keyId="{subscriber_id}|{unique_key_id}|{algorithm}", algorithm="ed25519",
//! created="{unix}", expires="{unix}", signature="{base64}"
//! ```
//!
//! Verifiers require only `keyId` and `signature`; unknown fields are
//! ignored, not rejected.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gateway_core::{GatewayError, KeyRegistry, Result};
use sha2::Sha256;
use std::path::Path;
use std::time::Duration;

/// Blake2b with a 256-bit output, the signature digest algorithm.
type Blake2b256 = Blake2b<U32>;

/// The only signature algorithm the gateway speaks.
pub const ALGORITHM: &str = "ed25519";

/// Default validity window stamped into outgoing signatures.
const DEFAULT_SIGNATURE_TTL: Duration = Duration::from_secs(300);

/// Identity and validity metadata attached to one signature.
#[derive(Debug, Clone)]
pub struct SignatureContext {
    /// Signing party's subscriber identifier.
    pub subscriber_id: String,
    /// Identifier of the specific key used.
    pub unique_key_id: String,
    /// Signature algorithm name.
    pub algorithm: String,
    /// When the signature was created.
    pub created_at: DateTime<Utc>,
    /// When the signature stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl SignatureContext {
    /// The `keyId` wire string: `"{subscriber_id}|{unique_key_id}|{algorithm}"`.
    #[must_use]
    pub fn key_id(&self) -> String {
        format!(
            "{}|{}|{}",
            self.subscriber_id, self.unique_key_id, self.algorithm
        )
    }
}

/// The fields of a parsed `Authorization` header value.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Counterparty subscriber identifier (first `keyId` segment).
    pub subscriber_id: String,
    /// Counterparty key identifier (second `keyId` segment).
    pub unique_key_id: String,
    /// Algorithm name (third `keyId` segment).
    pub algorithm: String,
    /// Base64 signature bytes.
    pub signature: String,
}

/// Signing, verification and replay-window checks.
///
/// Loaded once at startup; cheap to clone and share behind an `Arc`.
#[derive(Debug)]
pub struct TrustService {
    signing_key: Option<SigningKey>,
    subscriber_id: String,
    unique_key_id: String,
    signature_ttl: Duration,
}

impl TrustService {
    /// Build a service from raw key material.
    ///
    /// `private_key` is the 32-byte Ed25519 seed; `public_key` is the
    /// 32-byte public key it must correspond to.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if either key has the wrong
    /// length or the pair does not match.
    pub fn from_raw_keys(
        private_key: &[u8],
        public_key: &[u8],
        subscriber_id: impl Into<String>,
        unique_key_id: impl Into<String>,
    ) -> Result<Self> {
        let seed: [u8; 32] = private_key.try_into().map_err(|_| {
            GatewayError::Configuration(format!(
                "Private key must be 32 bytes, got {}",
                private_key.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&seed);

        let public: [u8; 32] = public_key.try_into().map_err(|_| {
            GatewayError::Configuration(format!(
                "Public key must be 32 bytes, got {}",
                public_key.len()
            ))
        })?;
        if signing_key.verifying_key().to_bytes() != public {
            return Err(GatewayError::Configuration(
                "Public key does not match private key".to_string(),
            ));
        }

        Ok(Self {
            signing_key: Some(signing_key),
            subscriber_id: subscriber_id.into(),
            unique_key_id: unique_key_id.into(),
            signature_ttl: DEFAULT_SIGNATURE_TTL,
        })
    }

    /// Build a service from two key files (base64-encoded raw keys, one
    /// per file).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if a file cannot be read,
    /// is not base64, or holds the wrong key length.
    pub fn from_key_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
        subscriber_id: impl Into<String>,
        unique_key_id: impl Into<String>,
    ) -> Result<Self> {
        let private = read_key_file(private_key_path.as_ref())?;
        let public = read_key_file(public_key_path.as_ref())?;
        let service = Self::from_raw_keys(&private, &public, subscriber_id, unique_key_id)?;
        tracing::info!(
            subscriber_id = %service.subscriber_id,
            unique_key_id = %service.unique_key_id,
            "Trust service keypair loaded"
        );
        Ok(service)
    }

    /// A service with no signing key. `verify` works; `sign` fails with a
    /// configuration error.
    #[must_use]
    pub fn verification_only() -> Self {
        Self {
            signing_key: None,
            subscriber_id: String::new(),
            unique_key_id: String::new(),
            signature_ttl: DEFAULT_SIGNATURE_TTL,
        }
    }

    /// Override the validity window stamped into outgoing signatures.
    #[must_use]
    pub const fn with_signature_ttl(mut self, ttl: Duration) -> Self {
        self.signature_ttl = ttl;
        self
    }

    /// This gateway's own public key bytes, when a keypair is loaded.
    #[must_use]
    pub fn public_key_bytes(&self) -> Option<[u8; 32]> {
        self.signing_key
            .as_ref()
            .map(|key| key.verifying_key().to_bytes())
    }

    /// Sign a payload and format the `Authorization` header value.
    ///
    /// Hashes the exact `payload` bytes with Blake2b-256 and signs the
    /// hash, not the raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if no private key is loaded
    /// or the subscriber identity is unset. These are fatal startup
    /// misconfigurations, not runtime conditions.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        let Some(signing_key) = self.signing_key.as_ref() else {
            return Err(GatewayError::Configuration(
                "No private key loaded".to_string(),
            ));
        };
        if self.subscriber_id.is_empty() || self.unique_key_id.is_empty() {
            return Err(GatewayError::Configuration(
                "Subscriber identity is unset".to_string(),
            ));
        }

        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(self.signature_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let context = SignatureContext {
            subscriber_id: self.subscriber_id.clone(),
            unique_key_id: self.unique_key_id.clone(),
            algorithm: ALGORITHM.to_string(),
            created_at,
            expires_at,
        };

        let digest = Blake2b256::digest(payload);
        let signature = signing_key.sign(&digest);

        Ok(format!(
            "keyId=\"{}\", algorithm=\"{}\", created=\"{}\", expires=\"{}\", signature=\"{}\"",
            context.key_id(),
            ALGORITHM,
            context.created_at.timestamp(),
            context.expires_at.timestamp(),
            BASE64.encode(signature.to_bytes()),
        ))
    }

    /// Verify an `Authorization` header against the exact payload bytes,
    /// resolving the counterparty key from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] for a blank or
    /// malformed header, an unsupported algorithm, an unknown key, or a
    /// signature that does not verify. Registry transport failures
    /// propagate as [`GatewayError::Unavailable`].
    pub async fn verify<R: KeyRegistry>(
        &self,
        auth_header: &str,
        payload: &[u8],
        registry: &R,
    ) -> Result<()> {
        let parsed = parse_authorization(auth_header)?;
        let public_key = registry
            .public_key(&parsed.subscriber_id, &parsed.unique_key_id)
            .await?;
        verify_signature(&public_key, payload, &parsed.signature)?;

        tracing::debug!(
            subscriber_id = %parsed.subscriber_id,
            unique_key_id = %parsed.unique_key_id,
            "Signature verified"
        );
        Ok(())
    }

    /// Check a request timestamp against the replay window.
    ///
    /// Rejects timestamps more than `window` away from now in *either*
    /// direction: stale requests and clock-skewed future requests alike.
    /// The boundary is inclusive — exactly `now ± window` passes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] for an unparseable
    /// timestamp or one outside the window.
    pub fn verify_timestamp(timestamp: &str, window: Duration) -> Result<()> {
        Self::verify_timestamp_at(timestamp, window, Utc::now())
    }

    /// [`verify_timestamp`](Self::verify_timestamp) against an explicit
    /// `now`, so the boundary is testable without racing the clock.
    fn verify_timestamp_at(timestamp: &str, window: Duration, now: DateTime<Utc>) -> Result<()> {
        let parsed = DateTime::parse_from_rfc3339(timestamp).map_err(|e| {
            GatewayError::AuthenticationFailed(format!("Invalid timestamp '{timestamp}': {e}"))
        })?;

        let skew = now
            .signed_duration_since(parsed.with_timezone(&Utc))
            .abs();
        let window = chrono::Duration::from_std(window)
            .map_err(|e| GatewayError::Configuration(format!("Replay window too large: {e}")))?;

        if skew > window {
            return Err(GatewayError::AuthenticationFailed(format!(
                "Timestamp outside replay window ({}s skew)",
                skew.num_seconds()
            )));
        }
        Ok(())
    }
}

/// Parse an `Authorization` header value into its signature fields.
///
/// Accepts comma-separated `key="value"` pairs; unknown keys are ignored.
/// Requires at minimum `keyId` and `signature`, and a `keyId` of exactly
/// three `|`-delimited parts with a supported algorithm.
///
/// # Errors
///
/// Returns [`GatewayError::AuthenticationFailed`] for any other shape.
pub fn parse_authorization(header: &str) -> Result<ParsedSignature> {
    if header.trim().is_empty() {
        return Err(GatewayError::AuthenticationFailed(
            "Empty authorization header".to_string(),
        ));
    }

    let mut key_id = None;
    let mut signature = None;
    for pair in header.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "keyId" => key_id = Some(value.to_string()),
            "signature" => signature = Some(value.to_string()),
            // Extra fields (algorithm, created, expires, ...) are legal
            // and carry no authority; keyId names the algorithm.
            _ => {}
        }
    }

    let key_id = key_id.ok_or_else(|| {
        GatewayError::AuthenticationFailed("Missing keyId field".to_string())
    })?;
    let signature = signature.ok_or_else(|| {
        GatewayError::AuthenticationFailed("Missing signature field".to_string())
    })?;

    let parts: Vec<&str> = key_id.split('|').collect();
    let [subscriber_id, unique_key_id, algorithm] = parts.as_slice() else {
        return Err(GatewayError::AuthenticationFailed(format!(
            "keyId must have 3 parts, got {}",
            parts.len()
        )));
    };
    if !algorithm.eq_ignore_ascii_case(ALGORITHM) {
        return Err(GatewayError::AuthenticationFailed(format!(
            "Unsupported algorithm '{algorithm}'"
        )));
    }

    Ok(ParsedSignature {
        subscriber_id: (*subscriber_id).to_string(),
        unique_key_id: (*unique_key_id).to_string(),
        algorithm: (*algorithm).to_string(),
        signature,
    })
}

/// Verify a base64 signature over the Blake2b-256 hash of `payload`.
///
/// # Errors
///
/// Returns [`GatewayError::AuthenticationFailed`] if the key or signature
/// bytes are malformed or the signature does not verify.
pub fn verify_signature(public_key: &[u8], payload: &[u8], signature_b64: &str) -> Result<()> {
    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        GatewayError::AuthenticationFailed(format!(
            "Public key must be 32 bytes, got {}",
            public_key.len()
        ))
    })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| GatewayError::AuthenticationFailed(format!("Invalid public key: {e}")))?;

    let signature_bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| GatewayError::AuthenticationFailed(format!("Invalid signature encoding: {e}")))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| GatewayError::AuthenticationFailed(format!("Invalid signature: {e}")))?;

    let digest = Blake2b256::digest(payload);
    verifying_key
        .verify(&digest, &signature)
        .map_err(|_| GatewayError::AuthenticationFailed("Signature mismatch".to_string()))
}

/// The HTTP `Digest` header value for a request body.
///
/// Always SHA-256 — independent of the Blake2b signature digest; the wire
/// protocol requires both.
#[must_use]
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    let encoded = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Configuration(format!("Cannot read key file {}: {e}", path.display()))
    })?;
    BASE64.decode(encoded.trim()).map_err(|e| {
        GatewayError::Configuration(format!("Key file {} is not base64: {e}", path.display()))
    })
}
