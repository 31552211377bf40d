//! Payment gateway integration.
//!
//! Key components:
//! 1.  **CircuitBreaker**: keeps a flapping upstream from stalling registration
//!     traffic by blocking calls after repeated failures.
//! 2.  **GatewayClient**: encapsulates order creation against the hosted
//!     provider's REST API. All network calls go through the circuit breaker.
//! 3.  **SignatureVerifier**: the HMAC scheme used to authenticate payment
//!     callbacks and webhooks.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Circuit breaker states.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation, requests allowed.
    Closed,
    /// Requests blocked after repeated failures.
    Open,
    /// One probe request allowed after the open timeout elapses.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: std::sync::RwLock<CircuitState>,
    /// Consecutive failure counter.
    failure_count: AtomicU32,
    /// Seconds since `started` at the moment of the last failure.
    last_failure_time: AtomicU64,
    started: Instant,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: std::sync::RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
            started: Instant::now(),
            failure_threshold,
            timeout_duration: Duration::from_secs(timeout_seconds),
        }
    }

    /// Whether the next request may be attempted.
    pub fn can_execute(&self) -> bool {
        let state = self.state.read().unwrap();

        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = self.started.elapsed().as_secs();
                let last_failure = self.last_failure_time.load(Ordering::Relaxed);

                if now.saturating_sub(last_failure) >= self.timeout_duration.as_secs() {
                    // Release the read lock before taking the write lock.
                    drop(state);
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                self.failure_count.store(0, Ordering::Relaxed);
                info!("Circuit breaker recovered - transitioning to Closed state");
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_time
            .store(self.started.elapsed().as_secs(), Ordering::Relaxed);

        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::Closed => {
                if failure_count >= self.failure_threshold {
                    *state = CircuitState::Open;
                    error!(
                        "Circuit breaker OPENED - {} failures reached threshold {}",
                        failure_count, self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker probe failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.state.read().unwrap().clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    Open,
    #[error("payment gateway error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Upstream(e.to_string())
    }
}

// --- Gateway API wire models ---

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

/// Order record as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// Client for the hosted payment provider's REST API.
#[derive(Clone)]
pub struct GatewayClient {
    key_id: String,
    key_secret: String,
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl GatewayClient {
    pub fn from_config(payment: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            breaker.failure_threshold,
            breaker.timeout_seconds,
        ));

        Self {
            key_id: payment.key_id.clone(),
            key_secret: payment.key_secret.clone(),
            base_url: payment.gateway_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            circuit_breaker,
        }
    }

    /// Runs one gateway call through the circuit breaker.
    async fn execute_with_circuit_breaker<F, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking payment gateway request");
            return Err(GatewayError::Open);
        }

        match operation.await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                error!("Payment gateway request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                Err(GatewayError::Http(e))
            }
        }
    }

    /// Creates an order with the provider. The returned order id is what the
    /// client-side checkout and all later callbacks reference.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let request = CreateOrderRequest {
            amount,
            currency,
            receipt,
        };

        info!(
            "Creating gateway order: amount={}, currency={}, receipt={}",
            amount, currency, receipt
        );

        let operation = async {
            self.http_client
                .post(format!("{}/v1/orders", self.base_url))
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<GatewayOrder>()
                .await
        };

        self.execute_with_circuit_breaker(operation).await
    }

    /// Verifier keyed with this client's secret.
    pub fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.key_secret.clone())
    }
}

/// HMAC-SHA256 over `"{order_id}|{payment_id}"`, hex-encoded, keyed with the
/// gateway secret. This is the scheme the provider uses for both browser
/// callbacks and server-to-server webhooks.
#[derive(Clone)]
pub struct SignatureVerifier {
    key_secret: String,
}

impl SignatureVerifier {
    pub fn new(key_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
        }
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        mac
    }

    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        hex::encode(self.mac(order_id, payment_id).finalize().into_bytes())
    }

    /// Constant-time check of a hex signature against the expected MAC.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let provided = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        self.mac(order_id, payment_id).verify_slice(&provided).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("order_abc123", "pay_xyz789");

        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(verifier.verify("order_abc123", "pay_xyz789", &sig));
    }

    #[test]
    fn tampered_signature_rejected() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("order_abc123", "pay_xyz789");

        let mut tampered = sig.clone();
        let flipped = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(flipped);

        assert!(!verifier.verify("order_abc123", "pay_xyz789", &tampered));
        assert!(!verifier.verify("order_abc123", "pay_other", &sig));
    }

    #[test]
    fn non_hex_signature_rejected() {
        let verifier = SignatureVerifier::new("test_secret");
        assert!(!verifier.verify("order_abc123", "pay_xyz789", "not-hex!"));
        assert!(!verifier.verify("order_abc123", "pay_xyz789", ""));
    }

    #[test]
    fn different_secret_produces_different_signature() {
        let a = SignatureVerifier::new("secret_a");
        let b = SignatureVerifier::new("secret_b");
        let sig = a.sign("order_1", "pay_1");
        assert!(!b.verify("order_1", "pay_1", &sig));
    }

    #[test]
    fn breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, 60);
        assert!(breaker.can_execute());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn breaker_recovers_through_half_open() {
        // Zero timeout lets the probe run immediately.
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);

        assert!(breaker.can_execute());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens_breaker() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.can_execute());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        // Counter restarts, so two more failures stay under the threshold.
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }
}
