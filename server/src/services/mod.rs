pub mod availability;
pub mod bookings;
pub mod checkout;
pub mod slots;
pub mod ticket_ledger;

pub use availability::AvailabilityCalendar;
pub use bookings::BookingLifecycle;
pub use checkout::{spawn_expiry_task, Checkout};
pub use slots::SlotLedger;
pub use ticket_ledger::TicketLedger;
