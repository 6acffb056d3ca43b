//! Table and time availability for a seating-reservation system: the pure
//! validation engine, a WAL-backed ledger per venue, and the booking
//! service that ties them together.

pub mod booking;
pub mod code;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod layout;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod venue;
pub mod wal;
