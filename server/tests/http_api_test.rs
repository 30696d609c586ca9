use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use marketplace_server::payments::stripe::sign_webhook_payload;
use marketplace_server::payments::{MockPaymentProcessor, PaymentProcessor};
use marketplace_server::routes::create_routes;
use marketplace_server::state::AppState;
use marketplace_server::store::MemoryStore;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    provider_id: Uuid,
    event_id: Uuid,
}

impl TestApp {
    fn new(processor: Option<Arc<dyn PaymentProcessor>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        store.register_event(event_id, provider_id);

        let state = AppState::new(store.clone(), processor, "http://localhost:3001")
            .with_webhook_secret(Some(WEBHOOK_SECRET.to_string()));
        Self {
            router: create_routes(state),
            store,
            provider_id,
            event_id,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        actor: Option<(Uuid, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            builder = builder
                .header("x-actor-id", id.to_string())
                .header("x-actor-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn create_ticket_type(&self, total: i32) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/events/{}/ticket-types", self.event_id),
                Some((self.provider_id, "provider")),
                Some(json!({ "name": "General", "price": 4500, "currency": "ron", "total": total })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }
}

#[tokio::test]
async fn health_check_carries_security_headers() {
    let app = TestApp::new(None);
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn ticket_type_lifecycle_over_http() {
    let app = TestApp::new(None);
    let id = app.create_ticket_type(10).await;

    let (status, body) = app
        .call(Method::GET, &format!("/ticket-types/{}", id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "RON");
    assert_eq!(body["data"]["remaining"], 10);

    let stranger = Uuid::new_v4();
    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/ticket-types/{}", id),
            Some((stranger, "provider")),
            Some(json!({ "total": 20 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/ticket-types/{}", id),
            Some((app.provider_id, "provider")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_actor_headers_are_rejected() {
    let app = TestApp::new(None);
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/events/{}/ticket-types", app.event_id),
            None,
            Some(json!({ "name": "General", "price": 1, "currency": "RON", "total": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn oversell_reports_remaining() {
    let app = TestApp::new(None);
    let id = app.create_ticket_type(3).await;

    let order = |quantity: i32| {
        json!({ "email": "buyer@example.com", "items": [{ "ticketTypeId": id, "quantity": quantity }] })
    };
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/events/{}/orders", app.event_id),
            None,
            Some(order(2)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["total"], 9000);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/events/{}/orders", app.event_id),
            None,
            Some(order(2)),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_INVENTORY");
    assert_eq!(body["error"]["message"], "Only 1 left");
    assert_eq!(body["error"]["details"]["remaining"], 1);
    assert_eq!(body["error"]["details"]["id"], id.to_string());
}

#[tokio::test]
async fn deferred_checkout_confirmed_by_signed_webhook() {
    let processor = Arc::new(MockPaymentProcessor::new());
    let app = TestApp::new(Some(processor.clone()));
    let id = app.create_ticket_type(5).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/events/{}/orders", app.event_id),
            None,
            Some(json!({ "email": "buyer@example.com", "items": [{ "ticketTypeId": id, "quantity": 2 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["checkoutUrl"].is_string());
    let order_id = body["data"]["orderId"].as_str().unwrap().to_string();

    let (_, body) = app
        .call(Method::GET, &format!("/orders/{}", order_id), None, None)
        .await;
    let session_id = body["data"]["paymentSessionId"].as_str().unwrap().to_string();

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "payment_status": "paid", "status": "complete" } }
    })
    .to_string();
    let webhook = |signature: String| {
        Request::post("/payments/webhook")
            .header("stripe-signature", signature)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let (status, _) = app
        .send(webhook("t=1,v1=deadbeef".to_string()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let now = chrono::Utc::now().timestamp();
    let signature = sign_webhook_payload(payload.as_bytes(), WEBHOOK_SECRET, now);
    let (status, _) = app.send(webhook(signature.clone())).await;
    assert_eq!(status, StatusCode::OK);
    // Redelivery is harmless.
    let (status, _) = app.send(webhook(signature)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call(Method::GET, &format!("/orders/{}", order_id), None, None)
        .await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["items"][0]["quantity"], 2);

    let (_, body) = app
        .call(Method::GET, &format!("/ticket-types/{}", id), None, None)
        .await;
    assert_eq!(body["data"]["sold"], 2);
}

#[tokio::test]
async fn payment_outage_is_retryable() {
    let processor = Arc::new(MockPaymentProcessor::new());
    processor.fail_next(1);
    let app = TestApp::new(Some(processor.clone()));
    let id = app.create_ticket_type(5).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/events/{}/orders", app.event_id),
            None,
            Some(json!({ "email": "buyer@example.com", "items": [{ "ticketTypeId": id, "quantity": 1 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "EXTERNAL_SERVICE_ERROR");
    assert_eq!(body["error"]["details"]["retryable"], true);
    let order_id = body["error"]["details"]["orderId"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/orders/{}/retry-payment", order_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["checkoutUrl"].is_string());
    assert_eq!(processor.sessions_created(), 1);
}

#[tokio::test]
async fn booking_transitions_over_http() {
    let app = TestApp::new(None);
    let client = Uuid::new_v4();
    let provider = Uuid::new_v4();

    let (status, body) = app
        .call(
            Method::POST,
            "/bookings",
            Some((client, "client")),
            Some(json!({ "providerId": provider, "date": "2026-11-07", "city": "Brasov", "priceGross": "800.00", "fee": "80.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let booking_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "pending");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/bookings/{}/transition", booking_id),
            Some((client, "client")),
            Some(json!({ "action": "accept" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "ILLEGAL_TRANSITION");
    assert_eq!(body["error"]["details"]["constraint"], "actor");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/bookings/{}/transition", booking_id),
            Some((provider, "provider")),
            Some(json!({ "action": "done" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["constraint"], "state");
    assert_eq!(body["error"]["details"]["status"], "pending");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/bookings/{}/transition", booking_id),
            Some((provider, "provider")),
            Some(json!({ "action": "accept" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "accepted");

    let (status, body) = app
        .call(
            Method::GET,
            &format!(
                "/providers/{}/availability?from=2026-11-06&to=2026-11-08",
                provider
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["free", "busy", "free"]);
}

#[tokio::test]
async fn availability_and_slots_over_http() {
    let app = TestApp::new(None);
    let provider = Uuid::new_v4();

    for _ in 0..2 {
        let (status, _) = app
            .call(
                Method::PUT,
                &format!("/providers/{}/availability/2026-05-01", provider),
                Some((provider, "provider")),
                Some(json!({ "status": "partial", "note": "mornings" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(app.store.availability_count(provider), 1);

    let activity_id = Uuid::new_v4();
    app.store.register_activity(activity_id, provider);
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/activities/{}/slots", activity_id),
            Some((provider, "provider")),
            Some(json!({
                "startAt": "2026-05-01T09:00:00Z",
                "endAt": "2026-05-01T11:00:00Z",
                "capacityTotal": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let slot_id = body["data"]["id"].as_str().unwrap().to_string();

    let buyer = Uuid::new_v4();
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/slots/{}/reservations", slot_id),
            Some((buyer, "client")),
            Some(json!({ "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "sold_out");

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/slots/{}/reservations", slot_id),
            Some((buyer, "client")),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "Sold out");
}
