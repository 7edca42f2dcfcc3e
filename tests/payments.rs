//! Payment client integration tests against mock provider endpoints.

#![cfg(feature = "payments")]

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use timeloop::{
    RazorpayClient, Settings, StripeClient, TimeloopError,
    payments::{CheckoutRequest, OrderRequest},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

fn order_request(amount: Option<u64>) -> OrderRequest {
    OrderRequest {
        amount,
        ..OrderRequest::default()
    }
}

// ── Razorpay ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_order_posts_with_basic_auth() {
    let server = MockServer::start().await;
    let credentials = STANDARD.encode("rzp_test_id:rzp_secret");
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("authorization", format!("Basic {credentials}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_Nx1",
            "entity": "order",
            "amount": 99900,
            "currency": "INR",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RazorpayClient::new("rzp_test_id", "rzp_secret").with_base_url(server.uri());
    let order = client.create_order(&order_request(Some(99900))).await.unwrap();

    assert_eq!(order.order_id, "order_Nx1");
    assert_eq!(order.amount, 99900);
    assert_eq!(order.currency, "INR");
    assert_eq!(order.key_id, "rzp_test_id");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["amount"], 99900);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["payment_capture"], 1);
    assert_eq!(body["notes"]["description"], "Timeloop AI Payment");
    assert!(body["receipt"].as_str().unwrap().starts_with("rcpt_"));
}

#[tokio::test]
async fn create_order_keeps_caller_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_2", "amount": 500, "currency": "USD"
        })))
        .mount(&server)
        .await;

    let request = OrderRequest {
        amount: Some(500),
        currency: Some("USD".to_string()),
        receipt: Some("invoice-7".to_string()),
        description: Some("Premium upgrade".to_string()),
    };
    RazorpayClient::new("id", "secret")
        .with_base_url(server.uri())
        .create_order(&request)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["receipt"], "invoice-7");
    assert_eq!(body["notes"]["description"], "Premium upgrade");
}

#[tokio::test]
async fn create_order_requires_amount() {
    let server = MockServer::start().await;
    let client = RazorpayClient::new("id", "secret").with_base_url(server.uri());

    for amount in [None, Some(0)] {
        let error = client.create_order(&order_request(amount)).await.unwrap_err();
        assert!(matches!(error, TimeloopError::InvalidPaymentRequest(_)));
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_order_surfaces_provider_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "Authentication failed" }
        })))
        .mount(&server)
        .await;

    let error = RazorpayClient::new("id", "bad")
        .with_base_url(server.uri())
        .create_order(&order_request(Some(100)))
        .await
        .unwrap_err();

    match error {
        TimeloopError::PaymentProvider {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, "razorpay");
            assert_eq!(status, 401);
            assert_eq!(message, "Authentication failed");
        }
        other => panic!("Expected PaymentProvider, got: {other:?}"),
    }
}

#[test]
fn order_request_uses_camel_case() {
    let request: OrderRequest =
        serde_json::from_str(r#"{"amount": 299900, "currency": "INR", "description": "x"}"#).unwrap();
    assert_eq!(request.amount, Some(299900));
    assert_eq!(request.receipt, None);
}

#[test]
fn razorpay_from_settings_needs_both_keys() {
    let only_id = Settings::from_lookup(|name| (name == "RAZORPAY_KEY_ID").then(|| "id".to_string()));
    let error = RazorpayClient::from_settings(&only_id).unwrap_err();
    assert!(error.to_string().contains("RAZORPAY_KEY_SECRET"));
}

// ── Stripe ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_checkout_session_posts_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("line_items%5B0%5D%5Bprice%5D=price_abc"))
        .and(body_string_contains("line_items%5B0%5D%5Bquantity%5D=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CheckoutRequest {
        price_id: Some("price_abc".to_string()),
        ..CheckoutRequest::default()
    };
    let session = StripeClient::new("sk_test_123")
        .with_base_url(server.uri())
        .create_checkout_session(&request)
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_1");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_1")
    );

    let requests = server.received_requests().await.unwrap();
    let form = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(form.contains("success_url=https%3A%2F%2Fexample.com%2Fsuccess"));
    assert!(form.contains("cancel_url=https%3A%2F%2Fexample.com%2Fcancel"));
}

#[tokio::test]
async fn create_checkout_session_requires_price() {
    let server = MockServer::start().await;
    let error = StripeClient::new("sk")
        .with_base_url(server.uri())
        .create_checkout_session(&CheckoutRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(error, TimeloopError::InvalidPaymentRequest(_)));
}

#[tokio::test]
async fn create_checkout_session_surfaces_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "No such price: 'price_x'" }
        })))
        .mount(&server)
        .await;

    let request = CheckoutRequest {
        price_id: Some("price_x".to_string()),
        ..CheckoutRequest::default()
    };
    let error = StripeClient::new("sk")
        .with_base_url(server.uri())
        .create_checkout_session(&request)
        .await
        .unwrap_err();

    match error {
        TimeloopError::PaymentProvider { provider, status, message } => {
            assert_eq!(provider, "stripe");
            assert_eq!(status, 400);
            assert_eq!(message, "No such price: 'price_x'");
        }
        other => panic!("Expected PaymentProvider, got: {other:?}"),
    }
}
