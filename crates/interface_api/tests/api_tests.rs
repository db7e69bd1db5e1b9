//! HTTP surface tests
//!
//! Drive the router end to end against the in-memory store and scripted
//! gateways.

use std::sync::Arc;

use axum_test::TestServer;
use http::{HeaderName, HeaderValue};
use serde_json::{json, Value};

use core_kernel::UserId;
use domain_payments::{
    Confirmation, CorrelationKey, GatewayRegistry, InMemoryPaymentStore, PaymentOrchestrator,
    PaymentStatus, ProviderName, WebhookReconciler,
};
use interface_api::{config::ApiConfig, create_router, AppState};
use test_utils::{webhook_body, ScriptedGateway};

struct TestApp {
    server: TestServer,
    conekta: Arc<ScriptedGateway>,
    user_id: UserId,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryPaymentStore::new());
    let conekta = Arc::new(ScriptedGateway::for_provider(ProviderName::Conekta));
    let stp = Arc::new(ScriptedGateway::for_provider(ProviderName::Stp));
    let registry = Arc::new(
        GatewayRegistry::new()
            .register(conekta.clone())
            .register(stp),
    );

    let state = AppState {
        orchestrator: Arc::new(PaymentOrchestrator::new(store.clone(), registry.clone())),
        reconciler: Arc::new(WebhookReconciler::new(store, registry)),
        config: Arc::new(ApiConfig::default()),
    };

    TestApp {
        server: TestServer::new(create_router(state)).expect("test server"),
        conekta,
        user_id: UserId::new(),
    }
}

fn user_header(user_id: UserId) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&user_id.to_string()).unwrap(),
    )
}

fn card_payment_body() -> Value {
    json!({
        "amount": "1000",
        "currency": "MXN",
        "payment_method": "card",
        "purpose": { "type": "course", "item_id": "rust-101" },
        "billing_details": { "name": "Ana Torres", "email": "ana@example.com" },
    })
}

async fn create_payment(app: &TestApp) -> String {
    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .post("/api/v1/payments")
        .add_header(name, value)
        .json(&card_payment_body())
        .await;
    response.assert_status(http::StatusCode::CREATED);
    response.json::<Value>()["payment_id"]
        .as_str()
        .expect("payment id in response")
        .to_string()
}

#[tokio::test]
async fn create_returns_created_with_checkout_material() {
    let app = test_app();
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .post("/api/v1/payments")
        .add_header(name, value)
        .json(&card_payment_body())
        .await;

    response.assert_status(http::StatusCode::CREATED);
    let body = response.json::<Value>();
    assert!(body["payment_id"].as_str().unwrap().starts_with("PAY-"));
    assert_eq!(body["provider_client_secret"], "secret_1");
}

#[tokio::test]
async fn create_without_caller_identity_is_unauthorized() {
    let app = test_app();

    let response = app
        .server
        .post("/api/v1/payments")
        .json(&card_payment_body())
        .await;

    response.assert_status(http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_with_unsupported_currency_returns_field_details() {
    let app = test_app();
    let (name, value) = user_header(app.user_id);

    let mut body = card_payment_body();
    body["currency"] = json!("EUR");
    let response = app
        .server
        .post("/api/v1/payments")
        .add_header(name, value)
        .json(&body)
        .await;

    response.assert_status(http::StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "currency");
}

#[tokio::test]
async fn create_bank_transfer_with_bad_clabe_returns_field_details() {
    let app = test_app();
    let (name, value) = user_header(app.user_id);

    let body = json!({
        "amount": "500",
        "currency": "MXN",
        "payment_method": "bank_transfer",
        "purpose": { "type": "course", "item_id": "rust-101" },
        "billing_details": {
            "name": "Ana Torres",
            "email": "ana@example.com",
            "bank_transfer": {
                "beneficiary_name": "Escuela Aula",
                "beneficiary_clabe": "032180000118359710",
                "institution_code": "40012",
            },
        },
    });
    let response = app
        .server
        .post("/api/v1/payments")
        .add_header(name, value)
        .json(&body)
        .await;

    response.assert_status(http::StatusCode::UNPROCESSABLE_ENTITY);
    let details = response.json::<Value>()["details"].clone();
    assert!(details
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["field"] == "billing_details.bank_transfer.beneficiary_clabe"));
}

#[tokio::test]
async fn get_payment_returns_projection() {
    let app = test_app();
    let payment_id = create_payment(&app).await;

    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .get(&format!("/api/v1/payments/{payment_id}"))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["status"], "processing");
    assert_eq!(body["provider"]["name"], "conekta");
    assert_eq!(body["provider"]["external_payment_id"], "EXT1");
}

#[tokio::test]
async fn get_unknown_payment_is_not_found() {
    let app = test_app();
    let (name, value) = user_header(app.user_id);

    let response = app
        .server
        .get("/api/v1/payments/PAY-00000000-0000-0000-0000-000000000000")
        .add_header(name, value)
        .await;
    response.assert_status(http::StatusCode::NOT_FOUND);

    // Malformed ids are indistinguishable from unknown ones
    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .get("/api/v1/payments/garbage")
        .add_header(name, value)
        .await;
    response.assert_status(http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verified_webhook_completes_payment() {
    let app = test_app();
    let payment_id = create_payment(&app).await;

    let body = webhook_body(
        "charge.paid",
        PaymentStatus::Completed,
        &CorrelationKey::ExternalPaymentId("EXT1".to_string()),
        Some("chg_hook"),
    );
    let response = app
        .server
        .post("/webhooks/conekta")
        .add_header(
            HeaderName::from_static("x-test-signature"),
            HeaderValue::from_str(app.conekta.webhook_secret()).unwrap(),
        )
        .bytes(body.into())
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["received"], true);

    let (name, value) = user_header(app.user_id);
    let projection = app
        .server
        .get(&format!("/api/v1/payments/{payment_id}"))
        .add_header(name, value)
        .await
        .json::<Value>();
    assert_eq!(projection["status"], "completed");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = test_app();
    create_payment(&app).await;

    let body = webhook_body(
        "charge.paid",
        PaymentStatus::Completed,
        &CorrelationKey::ExternalPaymentId("EXT1".to_string()),
        None,
    );
    let response = app
        .server
        .post("/webhooks/conekta")
        .add_header(
            HeaderName::from_static("x-test-signature"),
            HeaderValue::from_static("wrong-secret"),
        )
        .bytes(body.into())
        .await;

    response.assert_status(http::StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "invalid_signature");
}

#[tokio::test]
async fn webhook_for_unknown_provider_route_is_not_found() {
    let app = test_app();

    let response = app.server.post("/webhooks/stripe").bytes(b"{}".to_vec().into()).await;
    response.assert_status(http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn confirm_then_full_refund_marks_payment_refunded() {
    let app = test_app();
    let payment_id = create_payment(&app).await;

    app.conekta.script_confirm(Ok(Confirmation {
        charge_id: "chg_1".to_string(),
        raw_status: "paid".to_string(),
        status: PaymentStatus::Completed,
    }));

    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .post(&format!("/api/v1/payments/{payment_id}/confirm"))
        .add_header(name, value)
        .json(&json!({ "method_details": { "kind": "card_token", "token": "tok_1" } }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "completed");

    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .post(&format!("/api/v1/payments/{payment_id}/refunds"))
        .add_header(name, value)
        .json(&json!({ "reason": "course cancelled" }))
        .await;
    response.assert_status(http::StatusCode::CREATED);
    let refund = response.json::<Value>();
    assert_eq!(refund["status"], "completed");
    assert_eq!(refund["external_refund_id"], "ref_ext_1");

    let (name, value) = user_header(app.user_id);
    let projection = app
        .server
        .get(&format!("/api/v1/payments/{payment_id}"))
        .add_header(name, value)
        .await
        .json::<Value>();
    assert_eq!(projection["status"], "refunded");
}

#[tokio::test]
async fn refund_on_processing_payment_conflicts() {
    let app = test_app();
    let payment_id = create_payment(&app).await;

    let (name, value) = user_header(app.user_id);
    let response = app
        .server
        .post(&format!("/api/v1/payments/{payment_id}/refunds"))
        .add_header(name, value)
        .json(&json!({ "reason": "too early" }))
        .await;

    response.assert_status(http::StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "not_refundable");
}
