pub mod auth;
pub mod bookings;
pub mod chat;
pub mod health;
