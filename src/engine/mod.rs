//! The table/time availability engine.
//!
//! Pure and synchronous: callers materialize the reservations and
//! adjustments around a date, then ask whether a candidate fits.

mod conflict;
mod error;
mod interval;
mod validate;
#[cfg(test)]
mod tests;

pub use conflict::{find_conflict, is_spillover_blocker, DayView, Schedule, TableProbe};
pub use error::{Conflict, ConflictKind, ValidationError};
pub use interval::{estimate_duration, resolve_interval, translate_for_next_day};
pub use validate::{seats_taken, validate, Candidate, ValidationContext};

pub(crate) use interval::{checked_span, resolve_reservation};
