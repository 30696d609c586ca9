//! Scriptable in-process payment processor for development and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    PaymentError, PaymentProcessor, PaymentSession, PaymentStatus, SessionLineItem,
    SessionRequest,
};

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, PaymentStatus>,
    by_idempotency_key: HashMap<String, (Vec<SessionLineItem>, PaymentSession)>,
    failures_left: usize,
    lost_responses: usize,
    create_calls: usize,
}

/// Behaves like a hosted checkout: requests repeated with the same
/// idempotency key return the original session, and reusing a key with
/// different line items is rejected.
#[derive(Default)]
pub struct MockPaymentProcessor {
    state: Mutex<MockState>,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` session creations or expirations fail as if the
    /// processor were down.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures_left = count;
    }

    /// The next `count` sessions are created but the caller sees a timeout.
    pub fn lose_next_response(&self, count: usize) {
        self.state.lock().lost_responses = count;
    }

    /// Simulates the buyer completing payment. Expired sessions stay
    /// expired.
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(status) = self.state.lock().sessions.get_mut(session_id) {
            if *status == PaymentStatus::Unpaid {
                *status = PaymentStatus::Paid;
            }
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    fn take_failure(state: &mut MockState) -> Result<(), PaymentError> {
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(PaymentError::Unreachable("mock processor offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        Self::take_failure(&mut state)?;

        let key = request.idempotency_key();
        if let Some((line_items, existing)) = state.by_idempotency_key.get(&key) {
            if *line_items != request.line_items {
                return Err(PaymentError::Rejected(format!(
                    "idempotency key {} was used with different parameters",
                    key
                )));
            }
            return Ok(existing.clone());
        }

        let id = format!("mock_cs_{}", Uuid::new_v4().simple());
        let session = PaymentSession {
            url: format!("https://payments.mock/checkout/{}", id),
            id: id.clone(),
        };
        state.sessions.insert(id, PaymentStatus::Unpaid);
        state
            .by_idempotency_key
            .insert(key, (request.line_items.clone(), session.clone()));

        tracing::info!(
            order_id = %request.order_id,
            amount = request.amount,
            currency = %request.currency,
            session_id = %session.id,
            "Mock payment session created"
        );

        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(PaymentError::Unreachable("mock processor timed out".to_string()));
        }
        Ok(session)
    }

    async fn session_status(&self, session_id: &str) -> Result<PaymentStatus, PaymentError> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .copied()
            .ok_or_else(|| PaymentError::Rejected(format!("No such session: {}", session_id)))
    }

    async fn expire_session(&self, session_id: &str) -> Result<PaymentStatus, PaymentError> {
        let mut state = self.state.lock();
        Self::take_failure(&mut state)?;
        let status = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::Rejected(format!("No such session: {}", session_id)))?;
        if *status == PaymentStatus::Unpaid {
            *status = PaymentStatus::Expired;
        }
        Ok(*status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(order_id: Uuid) -> SessionRequest {
        SessionRequest {
            order_id,
            amount: 100,
            currency: "EUR".to_string(),
            customer_email: "a@b.c".to_string(),
            line_items: vec![],
            success_url: String::new(),
            cancel_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_same_order_gets_same_session() {
        let processor = MockPaymentProcessor::new();
        let order_id = Uuid::new_v4();

        let first = processor.create_session(&request(order_id)).await.unwrap();
        let second = processor.create_session(&request(order_id)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(processor.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_reused_key_with_other_items_is_rejected() {
        let processor = MockPaymentProcessor::new();
        let order_id = Uuid::new_v4();
        processor.create_session(&request(order_id)).await.unwrap();

        let mut changed = request(order_id);
        changed.line_items.push(SessionLineItem {
            name: "Renamed".to_string(),
            unit_amount: 100,
            quantity: 1,
        });
        assert!(matches!(
            processor.create_session(&changed).await,
            Err(PaymentError::Rejected(_))
        ));
        assert_eq!(processor.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_then_recovery() {
        let processor = MockPaymentProcessor::new();
        processor.fail_next(1);
        let order_id = Uuid::new_v4();

        assert!(processor.create_session(&request(order_id)).await.is_err());
        let session = processor.create_session(&request(order_id)).await.unwrap();
        assert_eq!(
            processor.session_status(&session.id).await.unwrap(),
            PaymentStatus::Unpaid
        );

        processor.mark_paid(&session.id);
        assert_eq!(
            processor.session_status(&session.id).await.unwrap(),
            PaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_expiring_closes_only_unpaid_sessions() {
        let processor = MockPaymentProcessor::new();
        let open = processor.create_session(&request(Uuid::new_v4())).await.unwrap();
        let paid = processor.create_session(&request(Uuid::new_v4())).await.unwrap();
        processor.mark_paid(&paid.id);

        assert_eq!(
            processor.expire_session(&open.id).await.unwrap(),
            PaymentStatus::Expired
        );
        processor.mark_paid(&open.id);
        assert_eq!(
            processor.session_status(&open.id).await.unwrap(),
            PaymentStatus::Expired
        );
        assert_eq!(
            processor.expire_session(&paid.id).await.unwrap(),
            PaymentStatus::Paid
        );
    }
}
