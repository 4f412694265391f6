//! Signed callback delivery with retry and dead-lettering.
//!
//! Protocol responses are pushed to counterparty callback URLs as signed
//! HTTP POSTs. The body is serialized once and signed once; every retry
//! sends the identical bytes under the identical signature, because a
//! re-serialized body would no longer match its signature.
//!
//! Retries follow the configured backoff table (see [`crate::backoff`]),
//! bounded by both the attempt budget and the caller's remaining TTL.
//! When the budget is exhausted the payload is published to the configured
//! dead-letter stream, if any, and the failure is returned to the caller.

use crate::backoff::backoff_delay;
use crate::trust::{TrustService, digest_header};
use gateway_core::{EventEnvelope, EventLog, GatewayConfig, GatewayError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Headers accompanying one callback POST.
#[derive(Debug, Clone)]
pub struct CallbackHeaders {
    /// `Content-Type` value.
    pub content_type: &'static str,
    /// `Digest` value (SHA-256 of the body).
    pub digest: String,
    /// `Authorization` value (signature over the body).
    pub authorization: String,
}

/// The HTTP leg of callback delivery.
///
/// Abstracted so the retry engine can be tested with scripted responses.
pub trait CallbackTransport: Send + Sync {
    /// POST `body` to `url`, returning the response status code.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] for connection failures and
    /// timeouts. A response with *any* status code is `Ok`; the caller
    /// decides what counts as success.
    fn post(
        &self,
        url: &str,
        headers: &CallbackHeaders,
        body: &[u8],
    ) -> impl Future<Output = Result<u16>> + Send;
}

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpCallbackTransport {
    client: reqwest::Client,
}

impl HttpCallbackTransport {
    /// Build a transport with the given per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if the underlying client
    /// cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl CallbackTransport for HttpCallbackTransport {
    async fn post(&self, url: &str, headers: &CallbackHeaders, body: &[u8]) -> Result<u16> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, headers.content_type)
            .header(reqwest::header::AUTHORIZATION, &headers.authorization)
            .header("Digest", &headers.digest)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Callback POST failed: {e}")))?;
        Ok(response.status().as_u16())
    }
}

/// Retrying, signing, dead-lettering callback sender.
pub struct CallbackDeliveryEngine<T, L> {
    transport: T,
    trust: Arc<TrustService>,
    log: L,
    config: GatewayConfig,
}

impl<T: CallbackTransport, L: EventLog> CallbackDeliveryEngine<T, L> {
    /// Create an engine.
    ///
    /// `log` is used only for dead-lettering; it is held unconditionally
    /// and consulted only when `config.dead_letter_stream` is set.
    pub const fn new(transport: T, trust: Arc<TrustService>, log: L, config: GatewayConfig) -> Self {
        Self {
            transport,
            trust,
            log,
            config,
        }
    }

    /// Deliver `payload` to `url`, retrying per configuration.
    ///
    /// `ttl` is the caller's remaining time budget; backoff delays are
    /// clamped to it and a spent budget stops retrying early. `request_id`
    /// tags logs and the dead-letter record.
    ///
    /// The body is signed once and every attempt resends the identical
    /// header: its `created`/`expires` stamps date from the first attempt,
    /// so the signature validity window must cover `ttl` for late retries
    /// to verify.
    ///
    /// Any 2xx response is success. Every other status, and every transport
    /// failure, is retried.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeliveryExhausted`] once the attempt budget
    /// or TTL is spent (after dead-lettering, when configured),
    /// [`GatewayError::Cancelled`] if `cancel` fires, and
    /// [`GatewayError::Serialization`] or [`GatewayError::Configuration`]
    /// if the payload cannot be serialized or signed.
    pub async fn send_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
        request_id: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let body =
            serde_json::to_vec(payload).map_err(|e| GatewayError::Serialization(e.to_string()))?;
        let headers = CallbackHeaders {
            content_type: "application/json",
            digest: digest_header(&body),
            authorization: self.trust.sign(&body)?,
        };

        let deadline = Instant::now() + ttl;
        let mut last_error = "no attempts made".to_string();
        let mut attempts = 0u32;

        for attempt in 1..=self.config.max_retries {
            attempts = attempt;
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                result = self.transport.post(url, &headers, &body) => result,
            };

            match outcome {
                Ok(status) if (200..300).contains(&status) => {
                    tracing::info!(url, request_id, status, attempt, "Callback delivered");
                    return Ok(());
                }
                Ok(status) => {
                    last_error = format!("HTTP {status}");
                    tracing::warn!(url, request_id, status, attempt, "Callback rejected");
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(url, request_id, attempt, error = %e, "Callback attempt failed");
                }
            }

            if attempt == self.config.max_retries {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let delay = backoff_delay(attempt, &self.config.callback_backoff_secs, remaining);
            if delay.is_zero() {
                tracing::warn!(url, request_id, attempt, "Delivery TTL spent, giving up early");
                break;
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.dead_letter(url, request_id, payload, &last_error, attempts)
            .await;
        Err(GatewayError::DeliveryExhausted {
            attempts,
            last_error,
        })
    }

    /// Publish an exhausted callback to the dead-letter stream.
    ///
    /// A dead-letter publish failure is logged and swallowed: the caller
    /// gets the original delivery error either way.
    async fn dead_letter(
        &self,
        url: &str,
        request_id: &str,
        payload: &serde_json::Value,
        error: &str,
        retries: u32,
    ) {
        let Some(stream) = self.config.dead_letter_stream.as_deref() else {
            tracing::error!(url, request_id, error, retries, "Callback dropped, no dead-letter stream");
            return;
        };

        let record = EventEnvelope::new(
            "callback.dead_letter".to_string(),
            serde_json::json!({
                "request_id": request_id,
                "callback_url": url,
                "payload": payload,
                "error": error,
                "timestamp": chrono::Utc::now().timestamp(),
                "retries": retries,
            }),
        );

        match self.log.publish(stream, &record).await {
            Ok(()) => {
                tracing::warn!(url, request_id, stream, retries, "Callback dead-lettered");
            }
            Err(e) => {
                tracing::error!(url, request_id, stream, error = %e, "Dead-letter publish failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use gateway_testing::InMemoryEventLog;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum Step {
        Status(u16),
        Fail(&'static str),
        Hang,
    }

    /// Transport that replays a fixed script of outcomes.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        attempts: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl CallbackTransport for &ScriptedTransport {
        async fn post(&self, _url: &str, _headers: &CallbackHeaders, _body: &[u8]) -> Result<u16> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Status(code)) => Ok(code),
                Some(Step::Fail(reason)) => Err(GatewayError::Unavailable(reason.to_string())),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(86_400)).await;
                    Ok(200)
                }
                None => panic!("transport called past end of script"),
            }
        }
    }

    fn trust() -> Arc<TrustService> {
        let public = SigningKey::from_bytes(&[7u8; 32]).verifying_key().to_bytes();
        Arc::new(TrustService::from_raw_keys(&[7u8; 32], &public, "gw.example.com", "key-1").unwrap())
    }

    fn engine<'a>(
        transport: &'a ScriptedTransport,
        config: GatewayConfig,
    ) -> (
        CallbackDeliveryEngine<&'a ScriptedTransport, InMemoryEventLog>,
        InMemoryEventLog,
    ) {
        let log = InMemoryEventLog::new();
        (
            CallbackDeliveryEngine::new(transport, trust(), log.clone(), config),
            log,
        )
    }

    const TTL: Duration = Duration::from_secs(3600);

    fn payload() -> serde_json::Value {
        serde_json::json!({"order_id": "o-1", "status": "CONFIRMED"})
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_on_first_attempt() {
        let transport = ScriptedTransport::new(vec![Step::Status(200)]);
        let (engine, _) = engine(&transport, GatewayConfig::new());
        let cancel = CancellationToken::new();

        engine
            .send_with_retry("https://client.example/cb", &payload(), "req-1", TTL, &cancel)
            .await
            .unwrap();
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_failures_and_non_2xx_until_success() {
        let transport = ScriptedTransport::new(vec![
            Step::Status(503),
            Step::Fail("connection refused"),
            Step::Status(202),
        ]);
        let (engine, _) = engine(&transport, GatewayConfig::new());
        let cancel = CancellationToken::new();

        engine
            .send_with_retry("https://client.example/cb", &payload(), "req-1", TTL, &cancel)
            .await
            .unwrap();
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_dead_letters_and_reports_last_error() {
        let transport = ScriptedTransport::new(vec![
            Step::Status(500),
            Step::Status(500),
            Step::Fail("connection reset"),
        ]);
        let config = GatewayConfig::new().with_dead_letter_stream("callbacks.dead");
        let (engine, log) = engine(&transport, config);
        let cancel = CancellationToken::new();

        // Default budget: 3 attempts with delays 1s and 2s, well inside 10s.
        let err = engine
            .send_with_retry(
                "https://client.example/cb",
                &payload(),
                "req-1",
                Duration::from_secs(10),
                &cancel,
            )
            .await
            .unwrap_err();

        assert_eq!(transport.attempts(), 3);
        let GatewayError::DeliveryExhausted { attempts, last_error } = err else {
            panic!("expected DeliveryExhausted, got {err}");
        };
        assert_eq!(attempts, 3);
        assert!(last_error.contains("connection reset"));

        // Exactly one dead-letter record with the full replay context.
        let message = log
            .read_one("callbacks.dead", "gateway", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        let record = EventEnvelope::from_bytes(&message.body).unwrap();
        assert_eq!(record.event_type, "callback.dead_letter");
        assert_eq!(record.payload["request_id"], "req-1");
        assert_eq!(record.payload["callback_url"], "https://client.example/cb");
        assert_eq!(record.payload["retries"], 3);
        assert_eq!(record.payload["payload"], payload());
    }

    #[tokio::test(start_paused = true)]
    async fn spent_ttl_stops_retrying_before_attempt_budget() {
        let transport = ScriptedTransport::new(vec![
            Step::Status(500),
            Step::Status(500),
            Step::Status(500),
            Step::Status(500),
            Step::Status(500),
        ]);
        let config = GatewayConfig::new()
            .with_max_retries(5)
            .with_backoff_secs(vec![10, 10, 10, 10]);
        let (engine, _) = engine(&transport, config);
        let cancel = CancellationToken::new();

        // Budget covers attempt 1 plus a single clamped delay.
        let err = engine
            .send_with_retry(
                "https://client.example/cb",
                &payload(),
                "req-1",
                Duration::from_secs(1),
                &cancel,
            )
            .await
            .unwrap_err();

        assert_eq!(transport.attempts(), 2);
        assert!(matches!(
            err,
            GatewayError::DeliveryExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_attempt() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let (engine, log) = engine(
            &transport,
            GatewayConfig::new().with_dead_letter_stream("callbacks.dead"),
        );
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            }
        };
        let payload = payload();
        let (result, ()) = tokio::join!(
            engine.send_with_retry("https://client.example/cb", &payload, "req-1", TTL, &cancel),
            canceller,
        );

        assert_eq!(result.unwrap_err(), GatewayError::Cancelled);
        // Cancellation is not exhaustion; nothing is dead-lettered.
        assert!(
            log.read_one("callbacks.dead", "gateway", Duration::from_millis(10))
                .await
                .unwrap()
                .is_none()
        );
    }
}
