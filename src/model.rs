use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight of a calendar date. Values past
/// [`MINUTES_PER_DAY`] denote occupancy that spills into the next date.
pub type Minute = i32;

pub const MINUTES_PER_DAY: Minute = 1440;

/// Half-open interval `[start, end)` on a single date's minute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the span runs past midnight into the following date.
    pub fn spills_over(&self) -> bool {
        self.end > MINUTES_PER_DAY
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_minute(self.start), format_minute(self.end))
    }
}

/// Parse `HH:MM` into minutes since midnight. Hours wrap at 24.
pub fn parse_hhmm(s: &str) -> Option<Minute> {
    let (h, m) = s.trim().split_once(':')?;
    let h: Minute = h.trim().parse().ok()?;
    let m: Minute = m.trim().parse().ok()?;
    if h < 0 || !(0..60).contains(&m) {
        return None;
    }
    Some((h % 24) * 60 + m)
}

/// Render minutes as `HH:MM`; minutes on the following date get a `+1` suffix.
pub fn format_minute(m: Minute) -> String {
    if m > MINUTES_PER_DAY {
        let m = m - MINUTES_PER_DAY;
        return format!("{:02}:{:02}+1", m / 60, m % 60);
    }
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Canonical table identifier, as produced by the layout resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub String);

impl TableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub zone_id: String,
    pub name: Option<String>,
    pub number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Booked,
    Arrived,
    Cancelled,
    NotArrived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Booked => "booked",
            Status::Arrived => "arrived",
            Status::Cancelled => "cancelled",
            Status::NotArrived => "not_arrived",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which reservation stream a reservation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    Ordinary,
    Event { event_id: Ulid },
}

impl Stream {
    pub fn kind(&self) -> StreamKind {
        match self {
            Stream::Ordinary => StreamKind::Ordinary,
            Stream::Event { .. } => StreamKind::Event,
        }
    }

    pub fn event_id(&self) -> Option<Ulid> {
        match self {
            Stream::Ordinary => None,
            Stream::Event { event_id } => Some(*event_id),
        }
    }
}

/// Stream tag without the owning event, used to filter store reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Ordinary,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub date: NaiveDate,
    /// Nominal start, minutes since midnight.
    pub start: Minute,
    pub party_size: u32,
    /// Canonical table ids in assignment order, no duplicates.
    pub tables: Vec<TableId>,
    pub guest_name: String,
    pub status: Status,
    /// Stay completed. Only meaningful for `Arrived`.
    pub cleared: bool,
    pub stream: Stream,
    pub code: Option<String>,
    pub zone_id: Option<String>,
    pub deleted: bool,
}

impl Reservation {
    pub fn uses_table(&self, table: &TableId) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    /// Cancelled, never showed up, or arrived and already left.
    pub fn is_finalized(&self) -> bool {
        match self.status {
            Status::Cancelled | Status::NotArrived => true,
            Status::Arrived => self.cleared,
            Status::Booked => false,
        }
    }

    /// Holds its slot for duplicate-booking purposes.
    pub fn is_booking_active(&self) -> bool {
        !self.deleted && !self.is_finalized()
    }

    /// A party is physically seated at its tables right now.
    pub fn is_physically_occupied(&self) -> bool {
        !self.deleted && self.status == Status::Arrived && !self.cleared
    }
}

/// Manual override of a reservation's default window for one date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub start: Option<Minute>,
    /// May exceed [`MINUTES_PER_DAY`] for spillover.
    pub end: Option<Minute>,
}

impl Adjustment {
    pub fn new(start: Option<Minute>, end: Option<Minute>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Adjustments of one date, keyed by reservation id.
pub type AdjustmentMap = HashMap<Ulid, Adjustment>;

/// A special event that owns the event reservation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Ulid,
    pub name: String,
    pub date: NaiveDate,
    /// Set for events that run into a later date.
    pub end_date: Option<NaiveDate>,
    pub start: Minute,
    pub end: Minute,
    pub capacity: Option<u32>,
}

impl Event {
    pub fn is_multi_day(&self) -> bool {
        self.end_date.is_some()
    }
}

/// The change records — flat, no nesting. This is the WAL record format
/// and the payload of date notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    ReservationSaved(Reservation),
    AdjustmentUpserted {
        date: NaiveDate,
        reservation_id: Ulid,
        adjustment: Adjustment,
    },
    EventSaved(Event),
    TableSaved(Table),
}
