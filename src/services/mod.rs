pub mod booking;
pub mod pending;
pub mod staff;
