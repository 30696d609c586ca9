//! Stripe Checkout over the REST API (no SDK dependency).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use super::{PaymentError, PaymentProcessor, PaymentSession, PaymentStatus, SessionRequest};

const STRIPE_API: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Webhooks signed longer ago than this are treated as replays.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

pub struct StripeProcessor {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeProcessor {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
        }
    }

    fn form_for(request: &SessionRequest) -> Vec<(String, String)> {
        let order_id = request.order_id.to_string();
        let currency = request.currency.to_ascii_lowercase();
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), order_id.clone()),
            ("metadata[order_id]".to_string(), order_id),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
            form.push((format!("{prefix}[price_data][currency]"), currency.clone()));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
        }
        form
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, PaymentError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Unreachable(e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            Err(PaymentError::Rejected(format!("{}: {}", status, message)))
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", request.idempotency_key())
            .timeout(REQUEST_TIMEOUT)
            .form(&Self::form_for(request))
            .send()
            .await
            .map_err(|e| PaymentError::Unreachable(e.to_string()))?;

        let body = Self::read_json(response).await?;
        match (body["id"].as_str(), body["url"].as_str()) {
            (Some(id), Some(url)) => Ok(PaymentSession {
                id: id.to_string(),
                url: url.to_string(),
            }),
            _ => Err(PaymentError::Rejected(format!(
                "Stripe create_checkout returned no session: {}",
                body
            ))),
        }
    }

    async fn session_status(&self, session_id: &str) -> Result<PaymentStatus, PaymentError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", STRIPE_API, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| PaymentError::Unreachable(e.to_string()))?;

        let body = Self::read_json(response).await?;
        Ok(status_from_session(&body))
    }

    async fn expire_session(&self, session_id: &str) -> Result<PaymentStatus, PaymentError> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions/{}/expire", STRIPE_API, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| PaymentError::Unreachable(e.to_string()))?;

        match Self::read_json(response).await {
            Ok(body) => Ok(status_from_session(&body)),
            // Stripe refuses to expire sessions that are no longer open;
            // the session itself says whether it was paid or already expired.
            Err(PaymentError::Rejected(reason)) => {
                tracing::debug!(session_id = %session_id, reason = %reason, "Stripe kept the session");
                self.session_status(session_id).await
            }
            Err(e) => Err(e),
        }
    }
}

fn status_from_session(session: &Value) -> PaymentStatus {
    match (session["payment_status"].as_str(), session["status"].as_str()) {
        (Some("paid"), _) | (Some("no_payment_required"), _) => PaymentStatus::Paid,
        (_, Some("expired")) => PaymentStatus::Expired,
        _ => PaymentStatus::Unpaid,
    }
}

/// A webhook event the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    SessionCompleted {
        event_id: String,
        session_id: String,
        paid: bool,
    },
    SessionExpired {
        event_id: String,
        session_id: String,
    },
    Ignored {
        event_type: String,
    },
}

pub fn parse_webhook_event(payload: &[u8]) -> Result<WebhookEvent, &'static str> {
    let event: Value = serde_json::from_slice(payload).map_err(|_| "Invalid webhook JSON")?;
    let event_type = event["type"].as_str().unwrap_or("");
    let event_id = event["id"].as_str().ok_or("Webhook event missing id")?;
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session_id = object["id"].as_str().ok_or("Webhook session missing id")?;
            Ok(WebhookEvent::SessionCompleted {
                event_id: event_id.to_string(),
                session_id: session_id.to_string(),
                paid: status_from_session(object) == PaymentStatus::Paid,
            })
        }
        "checkout.session.expired" => {
            let session_id = object["id"].as_str().ok_or("Webhook session missing id")?;
            Ok(WebhookEvent::SessionExpired {
                event_id: event_id.to_string(),
                session_id: session_id.to_string(),
            })
        }
        other => Ok(WebhookEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}

/// Verify Stripe webhook signature (HMAC-SHA256)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    let payload = std::str::from_utf8(payload).map_err(|_| "Webhook payload is not UTF-8")?;
    let signed_payload = format!("{timestamp}.{payload}");

    // Any v1 entry may match; Stripe sends several while rolling secrets.
    for signature in signatures {
        let Ok(sig_bytes) = hex::decode(signature) else {
            continue;
        };
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(&sig_bytes).is_ok() {
            return Ok(());
        }
    }

    Err("Webhook signature mismatch")
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    let signature = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(&signed);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    };
    format!("t={timestamp},v1={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::SessionLineItem;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign_webhook_payload(payload, "whsec_test", 1_700_000_000);

        assert!(verify_webhook_signature(payload, &header, "whsec_test", 1_700_000_010).is_ok());
        assert_eq!(
            verify_webhook_signature(b"{}", &header, "whsec_test", 1_700_000_010),
            Err("Webhook signature mismatch")
        );
        assert_eq!(
            verify_webhook_signature(payload, &header, "whsec_other", 1_700_000_010),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn test_signature_replay_window() {
        let payload = b"{}";
        let header = sign_webhook_payload(payload, "whsec_test", 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(payload, &header, "whsec_test", 1_700_000_000 + 301),
            Err("Webhook timestamp too old")
        );
        assert_eq!(
            verify_webhook_signature(payload, "v1=abc", "whsec_test", 0),
            Err("Invalid Stripe-Signature header")
        );
    }

    #[test]
    fn test_parse_completed_session() {
        let body = json!({
            "id": "evt_9",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_123", "payment_status": "paid", "status": "complete" } }
        });
        let event = parse_webhook_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            event,
            WebhookEvent::SessionCompleted {
                event_id: "evt_9".to_string(),
                session_id: "cs_123".to_string(),
                paid: true
            }
        );
    }

    #[test]
    fn test_status_from_expired_and_paid_sessions() {
        assert_eq!(
            status_from_session(&json!({ "status": "expired", "payment_status": "unpaid" })),
            PaymentStatus::Expired
        );
        assert_eq!(
            status_from_session(&json!({ "status": "complete", "payment_status": "paid" })),
            PaymentStatus::Paid
        );
        assert_eq!(
            status_from_session(&json!({ "status": "open", "payment_status": "unpaid" })),
            PaymentStatus::Unpaid
        );
    }

    #[test]
    fn test_parse_unrelated_event_is_ignored() {
        let body = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });
        assert!(matches!(
            parse_webhook_event(body.to_string().as_bytes()).unwrap(),
            WebhookEvent::Ignored { .. }
        ));
        assert!(parse_webhook_event(b"not json").is_err());
    }

    #[test]
    fn test_form_carries_order_metadata() {
        let order_id = Uuid::new_v4();
        let request = SessionRequest {
            order_id,
            amount: 10000,
            currency: "RON".to_string(),
            customer_email: "buyer@example.com".to_string(),
            line_items: vec![SessionLineItem {
                name: "VIP".to_string(),
                unit_amount: 5000,
                quantity: 2,
            }],
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
        };
        let form = StripeProcessor::form_for(&request);
        assert!(form.contains(&("metadata[order_id]".to_string(), order_id.to_string())));
        assert!(form.contains(&(
            "line_items[0][price_data][currency]".to_string(),
            "ron".to_string()
        )));
        assert!(form.contains(&("line_items[0][quantity]".to_string(), "2".to_string())));
        assert_eq!(request.idempotency_key(), format!("checkout-order-{}", order_id));
    }
}
