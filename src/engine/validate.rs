use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::conflict::{find_conflict, Schedule, TableProbe};
use super::interval::resolve_interval;
use super::ValidationError;

/// A reservation as it is about to be created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Present when editing; the stored copy is then ignored by every check.
    pub id: Option<Ulid>,
    pub date: NaiveDate,
    pub start: Minute,
    pub party_size: u32,
    pub tables: Vec<TableId>,
    pub guest_name: String,
    pub stream: Stream,
    pub code: Option<String>,
    /// Window override for the candidate (edit flows, or a booking created
    /// with an explicit end such as a next-day extension).
    pub adjustment: Option<Adjustment>,
}

impl Candidate {
    /// The window the candidate would occupy on its date.
    pub fn interval(&self) -> Result<Span, ValidationError> {
        resolve_interval(self.start, self.party_size, self.adjustment.as_ref())
    }
}

/// Data the pipeline needs, fully materialized by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationContext<'a> {
    /// The event owning an event-stream candidate.
    pub event: Option<&'a Event>,
    /// Every stored reservation of that event, any date or status.
    pub event_reservations: &'a [Reservation],
    pub schedule: Schedule<'a>,
}

/// Run the checks in order and stop at the first failure.
pub fn validate(candidate: &Candidate, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
    if candidate.guest_name.trim().is_empty() {
        return Err(ValidationError::MissingGuestName);
    }
    if candidate.party_size == 0 {
        return Err(ValidationError::InvalidGuestCount);
    }
    if let Some(event) = ctx.event {
        check_capacity(candidate, event, ctx.event_reservations)?;
    }

    let interval = candidate.interval()?;
    for table in &candidate.tables {
        let probe = TableProbe {
            id: candidate.id,
            table,
            interval,
        };
        if let Some(conflict) = find_conflict(&probe, &ctx.schedule)? {
            return Err(ValidationError::TableConflict(conflict));
        }
    }

    if let Some(event) = ctx.event {
        check_event_window(candidate, event)?;
    }
    if candidate.stream.kind() == StreamKind::Event
        && candidate.code.as_deref().is_none_or(|c| c.trim().is_empty())
    {
        return Err(ValidationError::MissingReservationCode);
    }
    Ok(())
}

/// Seats already promised for `event`, not counting the candidate's own
/// stored copy. Everything except cancelled and deleted reservations counts.
pub fn seats_taken(event: &Event, reservations: &[Reservation], exclude: Option<Ulid>) -> u64 {
    reservations
        .iter()
        .filter(|r| r.stream.event_id() == Some(event.id))
        .filter(|r| !r.deleted && r.status != Status::Cancelled)
        .filter(|r| exclude != Some(r.id))
        .map(|r| u64::from(r.party_size))
        .sum()
}

fn check_capacity(
    candidate: &Candidate,
    event: &Event,
    reservations: &[Reservation],
) -> Result<(), ValidationError> {
    // Zero means the event was saved without a limit.
    let Some(capacity) = event.capacity.filter(|c| *c > 0) else {
        return Ok(());
    };
    let taken = seats_taken(event, reservations, candidate.id);
    let remaining = u64::from(capacity).saturating_sub(taken);
    if u64::from(candidate.party_size) > remaining {
        return Err(ValidationError::CapacityExceeded {
            capacity,
            remaining: remaining as u32,
        });
    }
    Ok(())
}

fn check_event_window(candidate: &Candidate, event: &Event) -> Result<(), ValidationError> {
    let violation = ValidationError::EventWindowViolation {
        start: candidate.start,
        window_start: event.start,
        window_end: event.end,
    };
    if event.is_multi_day() {
        if candidate.date == event.date && candidate.start < event.start {
            return Err(violation);
        }
        return Ok(());
    }
    // A single-day event whose end is not after its start runs until or
    // past midnight.
    let end = if event.end <= event.start {
        event.end + MINUTES_PER_DAY
    } else {
        event.end
    };
    if candidate.start >= end {
        return Err(violation);
    }
    Ok(())
}
