//! Gateway client tests against a mock payment provider.

use summit_registration::config::{CircuitBreakerConfig, PaymentConfig};
use summit_registration::error::AppError;
use summit_registration::services::gateway::{GatewayClient, GatewayError};

use fake::Fake;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, failure_threshold: u32) -> GatewayClient {
    let payment = PaymentConfig {
        key_id: "rzp_test_key".to_string(),
        key_secret: "rzp_test_secret".to_string(),
        gateway_url: server.uri(),
    };
    let breaker = CircuitBreakerConfig {
        failure_threshold,
        timeout_seconds: 60,
    };
    GatewayClient::from_config(&payment, &breaker)
}

#[tokio::test]
async fn creates_order_against_provider() {
    let server = MockServer::start().await;
    let amount: i64 = (100_000..1_000_000).fake();

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({ "amount": amount, "currency": "INR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_mock_123",
            "entity": "order",
            "amount": amount,
            "currency": "INR",
            "receipt": "reg_7_1700000000",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let order = client
        .create_order(amount, "INR", "reg_7_1700000000")
        .await
        .expect("order creation should succeed");

    assert_eq!(order.id, "order_mock_123");
    assert_eq!(order.amount, amount);
    assert_eq!(order.currency, "INR");
    assert_eq!(order.receipt.as_deref(), Some("reg_7_1700000000"));
    assert_eq!(order.status, "created");
}

#[tokio::test]
async fn provider_error_maps_to_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let err = client
        .create_order(50_000, "INR", "reg_1_1")
        .await
        .expect_err("5xx must surface as an error");

    assert!(matches!(err, GatewayError::Http(_)));
    assert!(matches!(AppError::from(err), AppError::Upstream(_)));
}

#[tokio::test]
async fn breaker_blocks_after_repeated_failures() {
    let server = MockServer::start().await;

    // Exactly two requests reach the provider; the breaker eats the third.
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);

    for _ in 0..2 {
        let err = client
            .create_order(50_000, "INR", "reg_2_1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Http(_)));
    }

    let err = client
        .create_order(50_000, "INR", "reg_2_1")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Open));
}
