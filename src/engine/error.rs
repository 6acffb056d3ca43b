use ulid::Ulid;

use crate::model::{format_minute, Minute, Span, TableId};

/// Where the conflicting occupancy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another reservation on the candidate's own date.
    SameDay,
    /// A previous-day reservation still seated past midnight.
    Spillover,
    /// The candidate itself runs past midnight into a next-day reservation.
    NextDay,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::SameDay => "same_day",
            ConflictKind::Spillover => "spillover",
            ConflictKind::NextDay => "next_day",
        }
    }
}

/// The first occupant found blocking a candidate on one of its tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub table: TableId,
    pub reservation_id: Ulid,
    pub guest_name: String,
    /// The occupant's window on the axis it was compared on: the candidate's
    /// date for `SameDay` and `Spillover`, the next date for `NextDay`.
    pub interval: Span,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingGuestName,
    InvalidGuestCount,
    CapacityExceeded {
        capacity: u32,
        remaining: u32,
    },
    TableConflict(Conflict),
    EventWindowViolation {
        start: Minute,
        window_start: Minute,
        window_end: Minute,
    },
    MissingReservationCode,
    InvalidAdjustment {
        reservation_id: Option<Ulid>,
        start: Minute,
        end: Minute,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingGuestName => write!(f, "guest name is required"),
            ValidationError::InvalidGuestCount => {
                write!(f, "number of guests must be greater than zero")
            }
            ValidationError::CapacityExceeded { capacity, remaining } => {
                if *remaining > 0 {
                    write!(f, "event is limited to {capacity} guests; only {remaining} seats remain")
                } else {
                    write!(f, "event is limited to {capacity} guests; no seats are left")
                }
            }
            ValidationError::TableConflict(c) => {
                let origin = match c.kind {
                    ConflictKind::SameDay => "",
                    ConflictKind::Spillover => " (previous-day reservation)",
                    ConflictKind::NextDay => " (next-day reservation)",
                };
                write!(
                    f,
                    "table {} is occupied{origin} from {} to {} by {}",
                    c.table,
                    format_minute(c.interval.start),
                    format_minute(c.interval.end),
                    c.guest_name
                )
            }
            ValidationError::EventWindowViolation {
                start,
                window_start,
                window_end,
            } => write!(
                f,
                "arrival at {} is outside the event window {}-{}",
                format_minute(*start),
                format_minute(*window_start),
                format_minute(*window_end)
            ),
            ValidationError::MissingReservationCode => write!(f, "reservation code is missing"),
            ValidationError::InvalidAdjustment {
                reservation_id,
                start,
                end,
            } => match reservation_id {
                Some(id) => write!(f, "invalid adjustment for {id}: end {end} <= start {start}"),
                None => write!(f, "invalid adjustment: end {end} <= start {start}"),
            },
        }
    }
}

impl std::error::Error for ValidationError {}
