use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use court_api::{
    app,
    middleware::issue_token,
    settings::DomainSettings,
    state::{AppState, AuthConfig},
};
use court_catalog::{PricingConfig, Venue};
use court_core::models::{Court, PaymentMethod};
use court_core::payment::{GatewayStatus, PaymentGateway};
use court_core::{BookingStore, Role, TracingEventSink};
use court_order::{BookingPolicy, InMemoryBookingStore, MockPaymentGateway, RetryPolicy};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct TestApp {
    app: Router,
    court: Court,
    gateway: Arc<MockPaymentGateway>,
    venue: Venue,
}

async fn test_app(manual_payment_mode: bool) -> TestApp {
    let store = Arc::new(InMemoryBookingStore::new());
    let court = Court::new("Court 1", Decimal::from(50000), Decimal::from(30000));
    store.save_court(&court).await.unwrap();

    let venue = Venue::new(300, 6, 23).unwrap();
    let settings = DomainSettings {
        venue,
        pricing: PricingConfig::default(),
        policy: BookingPolicy::default(),
        retry: RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(std::time::Duration::from_millis(1))
            .max_delay(std::time::Duration::from_millis(5))
            .build(),
        manual_payment_mode,
    };
    let gateway = Arc::new(MockPaymentGateway::new(PaymentMethod::Payme));

    let state = AppState::build(
        store,
        &settings,
        Arc::new(TracingEventSink),
        vec![gateway.clone() as Arc<dyn PaymentGateway>],
        AuthConfig { secret: SECRET.to_string(), expiration: 3600 },
    )
    .unwrap();

    TestApp { app: app(state), court, gateway, venue }
}

impl TestApp {
    /// Two days ahead in venue time, so every slot of the day is still bookable.
    fn date(&self) -> NaiveDate {
        self.venue.local_date(Utc::now() + Duration::days(2))
    }

    fn hold_body(&self, hour: u32) -> Value {
        json!({
            "court_id": self.court.id,
            "start": self.venue.at(self.date(), hour).to_rfc3339(),
        })
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        who: Option<(&str, Role)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((sub, role)) = who {
            let token = issue_token(SECRET, sub, role, 3600).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn metrics(&self) -> String {
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}

const CUSTOMER: (&str, Role) = ("c-1", Role::Customer);
const OTHER: (&str, Role) = ("c-2", Role::Customer);
const GUARD: (&str, Role) = ("g-1", Role::Guard);
const MANAGER: (&str, Role) = ("m-1", Role::Manager);
const ADMIN: (&str, Role) = ("a-1", Role::Admin);

#[tokio::test]
async fn test_health_and_public_catalog() {
    let t = test_app(false).await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, courts) = t.call("GET", "/v1/courts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(courts.as_array().unwrap().len(), 1);

    let uri = format!("/v1/availability?date={}&court_id={}", t.date(), t.court.id);
    let (status, availability) = t.call("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability[0]["slots"].as_array().unwrap().len(), 17);
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let t = test_app(false).await;
    let (status, body) = t.call("POST", "/v1/reservations", None, Some(t.hold_body(19))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let request = Request::builder()
        .method("GET")
        .uri("/v1/reservations")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hold_conflict_and_manual_confirmation_flow() {
    let t = test_app(false).await;

    let (status, quote) = t.call("POST", "/v1/quotes", Some(CUSTOMER), Some(t.hold_body(19))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["pricing"]["is_peak"], true);

    let (status, hold) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(19))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["status"], "HOLD");
    let id = hold["id"].as_str().unwrap().to_string();

    let (status, body) = t.call("POST", "/v1/reservations", Some(OTHER), Some(t.hold_body(19))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "slot_conflict");

    // Outside manual mode only staff record cash
    let manual = format!("/v1/reservations/{}/payments/manual", id);
    let (status, _) = t.call("POST", &manual, Some(CUSTOMER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, confirmed) = t.call("POST", &manual, Some(MANAGER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["reservation"]["status"], "CONFIRMED");

    let (status, again) = t.call("POST", &manual, Some(MANAGER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["status"], "already_confirmed");

    let (status, ticket) = t
        .call("GET", &format!("/v1/reservations/{}/ticket", id), Some(CUSTOMER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let credential = ticket["credential"].as_str().unwrap().to_string();
    assert!(credential.starts_with("TNS-"));

    let (status, _) = t
        .call("GET", &format!("/v1/reservations/{}", id), Some(OTHER), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let redeem = Some(json!({ "credential": credential }));
    let (status, _) = t.call("POST", "/v1/tickets/redeem", Some(CUSTOMER), redeem.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Two days early
    let (status, body) = t.call("POST", "/v1/tickets/redeem", Some(GUARD), redeem).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "outside_window");

    let (status, mine) = t.call("GET", "/v1/reservations", Some(CUSTOMER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let metrics = t.metrics().await;
    assert!(metrics.contains("holds_created_total 1"));
    assert!(metrics.contains("slot_conflicts_total 1"));
    assert!(metrics.contains("payments_confirmed_total 1"));
}

#[tokio::test]
async fn test_customer_confirms_own_hold_in_manual_mode() {
    let t = test_app(true).await;
    let (_, hold) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(10))).await;
    let manual = format!("/v1/reservations/{}/payments/manual", hold["id"].as_str().unwrap());

    let (status, confirmed) = t.call("POST", &manual, Some(CUSTOMER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
}

#[tokio::test]
async fn test_gateway_payment_is_polled_to_confirmation() {
    let t = test_app(false).await;
    t.gateway.push_poll(Ok(GatewayStatus::Pending)).await;
    t.gateway.push_poll(Ok(GatewayStatus::Paid)).await;

    let (_, hold) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(9))).await;
    let id = hold["id"].as_str().unwrap().to_string();

    let (status, payment) = t
        .call(
            "POST",
            &format!("/v1/reservations/{}/payments", id),
            Some(CUSTOMER),
            Some(json!({ "method": "payme" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(payment["status"], "PROCESSING");
    assert!(payment["payment_url"].as_str().is_some());

    let details_uri = format!("/v1/reservations/{}", id);
    let mut status_seen = Value::Null;
    for _ in 0..100 {
        let (_, details) = t.call("GET", &details_uri, Some(CUSTOMER), None).await;
        status_seen = details["reservation"]["status"].clone();
        if status_seen == "CONFIRMED" {
            assert_eq!(details["payment"]["status"], "PAID");
            assert!(details["ticket"]["credential"].is_string());
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(status_seen, "CONFIRMED");
    assert!(t.metrics().await.contains("payments_confirmed_total 1"));
}

#[tokio::test]
async fn test_unsupported_payment_method_is_rejected() {
    let t = test_app(false).await;
    let (_, hold) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(11))).await;

    let (status, body) = t
        .call(
            "POST",
            &format!("/v1/reservations/{}/payments", hold["id"].as_str().unwrap()),
            Some(CUSTOMER),
            Some(json!({ "method": "click" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn test_cancel_releases_the_slot() {
    let t = test_app(false).await;
    let (_, hold) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(12))).await;
    let cancel = format!("/v1/reservations/{}/cancel", hold["id"].as_str().unwrap());

    let (status, receipt) = t.call("POST", &cancel, Some(CUSTOMER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["reservation"]["status"], "CANCELLED");
    assert!(receipt["refund"].is_null());

    let (status, body) = t.call("POST", &cancel, Some(CUSTOMER), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    let (status, _) = t.call("POST", "/v1/reservations", Some(OTHER), Some(t.hold_body(12))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_court_administration() {
    let t = test_app(false).await;
    let uri = format!("/v1/admin/courts/{}", t.court.id);
    let body = Some(json!({ "is_active": false }));

    let (status, _) = t.call("PATCH", &uri, Some(MANAGER), body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, court) = t.call("PATCH", &uri, Some(ADMIN), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(court["is_active"], false);

    let (status, body) = t.call("POST", "/v1/reservations", Some(CUSTOMER), Some(t.hold_body(19))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
}
