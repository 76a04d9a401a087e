pub mod api;
pub mod authenticate;
pub mod booker;
pub mod config;
pub mod dashboard;
pub mod json_db;
pub mod pricing;
pub mod registry;
pub mod routes;
pub mod slot_time;

pub use booker::{Booking, BookingApp};
