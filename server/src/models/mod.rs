pub mod actor;
pub mod availability;
pub mod booking;
pub mod order;
pub mod slot;
pub mod ticket;
