use std::sync::Arc;

use crate::payments::PaymentProcessor;
use crate::services::{AvailabilityCalendar, BookingLifecycle, Checkout, SlotLedger, TicketLedger};
use crate::store::{AvailabilityStore, BookingStore, OrderStore, SlotStore, TicketStore};

/// Shared handler state. Every service sits behind an `Arc`, so cloning is
/// cheap.
#[derive(Clone)]
pub struct AppState {
    pub tickets: Arc<TicketLedger>,
    pub checkout: Arc<Checkout>,
    pub bookings: Arc<BookingLifecycle>,
    pub availability: Arc<AvailabilityCalendar>,
    pub slots: Arc<SlotLedger>,
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        processor: Option<Arc<dyn PaymentProcessor>>,
        public_base_url: impl Into<String>,
    ) -> Self
    where
        S: TicketStore + OrderStore + BookingStore + AvailabilityStore + SlotStore + 'static,
    {
        let availability = Arc::new(AvailabilityCalendar::new(store.clone()));
        Self {
            tickets: Arc::new(TicketLedger::new(store.clone())),
            checkout: Arc::new(Checkout::new(
                store.clone(),
                store.clone(),
                processor,
                public_base_url,
            )),
            bookings: Arc::new(BookingLifecycle::new(store.clone(), availability.clone())),
            availability,
            slots: Arc::new(SlotLedger::new(store)),
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.map(Arc::from);
        self
    }
}
