use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::{
    estimate_duration, resolve_reservation, translate_for_next_day, validate, Candidate, DayView, Schedule,
    ValidationContext, ValidationError,
};
use crate::limits::*;
use crate::model::*;
use crate::observability as obs;
use crate::store::{AdjustmentStore, EventRepository, LayoutResolver, ReservationStore, StoreError};

/// A booking request as entered by staff. Tables are free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDraft {
    pub date: NaiveDate,
    pub start: Minute,
    pub party_size: u32,
    pub tables: Vec<String>,
    pub guest_name: String,
    pub stream: Stream,
    pub code: Option<String>,
    pub zone_id: Option<String>,
    /// Explicit window, e.g. an end past midnight for a next-day extension.
    pub adjustment: Option<Adjustment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Arrive,
    Clear,
    Cancel,
    NoShow,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Arrive => "arrive",
            Transition::Clear => "clear",
            Transition::Cancel => "cancel",
            Transition::NoShow => "no-show",
        })
    }
}

#[derive(Debug)]
pub enum BookingError {
    Rejected(ValidationError),
    UnknownTable(String),
    NotFound(Ulid),
    /// Cancelled, no-show or cleared reservations can no longer be changed.
    Finalized(Ulid),
    InvalidTransition {
        from: Status,
        cleared: bool,
        to: Transition,
    },
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::Rejected(e) => write!(f, "{e}"),
            BookingError::UnknownTable(t) => write!(f, "unknown table: {t:?}"),
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::Finalized(id) => write!(f, "reservation {id} is finalized"),
            BookingError::InvalidTransition { from, cleared, to } => {
                let from = if *cleared { "arrived (cleared)" } else { from.as_str() };
                write!(f, "cannot {to} a reservation that is {from}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        BookingError::Store(e)
    }
}

impl From<ValidationError> for BookingError {
    fn from(e: ValidationError) -> Self {
        BookingError::Rejected(e)
    }
}

/// One reservation's occupancy on a date's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub reservation_id: Ulid,
    pub guest_name: String,
    pub tables: Vec<TableId>,
    pub interval: Span,
    /// Seated party from the previous date still at the table.
    pub carried_over: bool,
}

/// Step a reservation through its lifecycle:
/// `booked → arrived → arrived & cleared`, `booked → cancelled`,
/// `booked → not_arrived`.
pub fn apply_transition(r: &mut Reservation, to: Transition) -> Result<(), BookingError> {
    match (r.status, r.cleared, to) {
        (Status::Booked, _, Transition::Arrive) => r.status = Status::Arrived,
        (Status::Arrived, false, Transition::Clear) => r.cleared = true,
        (Status::Booked, _, Transition::Cancel) => r.status = Status::Cancelled,
        (Status::Booked, _, Transition::NoShow) => r.status = Status::NotArrived,
        (from, cleared, to) => return Err(BookingError::InvalidTransition { from, cleared, to }),
    }
    Ok(())
}

/// Validates every write against the engine immediately before issuing it.
pub struct BookingService {
    reservations: Arc<dyn ReservationStore>,
    adjustments: Arc<dyn AdjustmentStore>,
    events: Arc<dyn EventRepository>,
    layout: Arc<dyn LayoutResolver>,
}

impl BookingService {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        adjustments: Arc<dyn AdjustmentStore>,
        events: Arc<dyn EventRepository>,
        layout: Arc<dyn LayoutResolver>,
    ) -> Self {
        Self {
            reservations,
            adjustments,
            events,
            layout,
        }
    }

    pub async fn book(&self, draft: ReservationDraft) -> Result<Reservation, BookingError> {
        check_limits(&draft)?;
        let tables = self.canonical_tables(&draft.tables)?;
        let candidate = Candidate {
            id: None,
            date: draft.date,
            start: draft.start,
            party_size: draft.party_size,
            tables,
            guest_name: draft.guest_name,
            stream: draft.stream,
            code: draft.code,
            adjustment: draft.adjustment,
        };
        self.check(&candidate).await?;

        let reservation = Reservation {
            id: Ulid::new(),
            date: candidate.date,
            start: candidate.start,
            party_size: candidate.party_size,
            tables: candidate.tables,
            guest_name: candidate.guest_name.trim().to_string(),
            status: Status::Booked,
            cleared: false,
            stream: candidate.stream,
            code: candidate.code.map(|c| c.trim().to_string()),
            zone_id: draft.zone_id,
            deleted: false,
        };
        self.reservations.create(reservation.clone()).await?;
        metrics::counter!(obs::RESERVATIONS_WRITTEN_TOTAL, "op" => "create").increment(1);
        info!(
            "booked {} for {} on {} at {}",
            reservation.id,
            reservation.guest_name,
            reservation.date,
            format_minute(reservation.start)
        );

        if let Some(adjustment) = candidate.adjustment.filter(|a| !a.is_empty()) {
            self.save_adjustment_best_effort(reservation.date, reservation.id, adjustment)
                .await;
        }
        Ok(reservation)
    }

    /// Edit an existing reservation. Its status and stream are kept.
    pub async fn update(&self, id: Ulid, draft: ReservationDraft) -> Result<Reservation, BookingError> {
        check_limits(&draft)?;
        let existing = self.load_live(id).await?;
        let tables = self.canonical_tables(&draft.tables)?;

        let timing_kept = existing.date == draft.date && existing.start == draft.start;
        let stored = if timing_kept {
            self.adjustments.get_one(existing.date, id).await?
        } else {
            None
        };
        let candidate = Candidate {
            id: Some(id),
            date: draft.date,
            start: draft.start,
            party_size: draft.party_size,
            tables,
            guest_name: draft.guest_name,
            stream: existing.stream,
            code: draft.code.or_else(|| existing.code.clone()),
            adjustment: draft.adjustment.or(stored),
        };
        self.check(&candidate).await?;

        let updated = Reservation {
            date: candidate.date,
            start: candidate.start,
            party_size: candidate.party_size,
            tables: candidate.tables,
            guest_name: candidate.guest_name.trim().to_string(),
            code: candidate.code.map(|c| c.trim().to_string()),
            zone_id: draft.zone_id.or(existing.zone_id.clone()),
            ..existing.clone()
        };
        self.reservations.update(updated.clone()).await?;
        metrics::counter!(obs::RESERVATIONS_WRITTEN_TOTAL, "op" => "update").increment(1);
        info!("updated {id} for {}", updated.guest_name);

        // A moved reservation keeps no window from where it was, and picks
        // up none left over on its new date.
        let overwritten = draft.adjustment.is_some() && existing.date == updated.date;
        if !timing_kept && !overwritten {
            self.clear_adjustment(existing.date, id).await?;
        }
        match draft.adjustment {
            Some(adjustment) => {
                self.save_adjustment_best_effort(updated.date, id, adjustment).await;
            }
            None if existing.date != updated.date => self.clear_adjustment(updated.date, id).await?,
            None => {}
        }
        Ok(updated)
    }

    /// Override a reservation's window on `date`, which must be its own
    /// date. The new window must pass the same checks as a booking.
    pub async fn adjust(&self, date: NaiveDate, id: Ulid, adjustment: Adjustment) -> Result<Span, BookingError> {
        check_adjustment_bounds(&adjustment)?;
        let r = self.load_live(id).await?;
        if r.date != date {
            return Err(BookingError::NotFound(id));
        }
        let candidate = Candidate {
            id: Some(id),
            date: r.date,
            start: r.start,
            party_size: r.party_size,
            tables: r.tables.clone(),
            guest_name: r.guest_name.clone(),
            stream: r.stream,
            code: r.code.clone(),
            adjustment: Some(adjustment),
        };
        let interval = candidate.interval()?;
        self.check(&candidate).await?;
        self.adjustments.upsert(r.date, id, adjustment).await?;
        info!("adjusted {id} on {} to {interval}", r.date);
        Ok(interval)
    }

    pub async fn mark_arrived(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.transition(id, Transition::Arrive).await
    }

    pub async fn mark_cleared(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.transition(id, Transition::Clear).await
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.transition(id, Transition::Cancel).await
    }

    pub async fn mark_not_arrived(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.transition(id, Transition::NoShow).await
    }

    async fn transition(&self, id: Ulid, to: Transition) -> Result<Reservation, BookingError> {
        let mut r = self.load(id).await?;
        apply_transition(&mut r, to)?;
        self.reservations.update(r.clone()).await?;
        metrics::counter!(obs::RESERVATIONS_WRITTEN_TOTAL, "op" => "status").increment(1);
        info!("{id}: {to} -> {}", r.status);
        Ok(r)
    }

    /// Soft-delete. The record stays readable for history.
    pub async fn remove(&self, id: Ulid) -> Result<(), BookingError> {
        let mut r = self.load(id).await?;
        r.deleted = true;
        self.reservations.update(r).await?;
        metrics::counter!(obs::RESERVATIONS_WRITTEN_TOTAL, "op" => "delete").increment(1);
        info!("removed {id}");
        Ok(())
    }

    /// Timeline of `date`: every booking-active reservation with its
    /// effective window, plus parties still seated from the previous date.
    pub async fn occupancy(&self, date: NaiveDate) -> Result<Vec<Slot>, BookingError> {
        let mut slots = Vec::new();

        if let Some(prev) = date.pred_opt() {
            let seated = self
                .reservations
                .list_with_status(prev, StreamKind::Ordinary, &[Status::Arrived])
                .await?;
            let adjustments = self.adjustments.get_by_date(prev).await?;
            for r in seated.iter().filter(|r| crate::engine::is_spillover_blocker(r)) {
                if let Some(spill) = translate_for_next_day(&effective_or_default(r, &adjustments)) {
                    slots.push(slot(r, spill, true));
                }
            }
        }

        let (same_day, adjustments) = self.load_day(date).await?;
        for r in same_day.iter().filter(|r| r.is_booking_active()) {
            slots.push(slot(r, effective_or_default(r, &adjustments), false));
        }
        Ok(slots)
    }

    async fn load(&self, id: Ulid) -> Result<Reservation, BookingError> {
        match self.reservations.get(id).await? {
            Some(r) if !r.deleted => Ok(r),
            _ => Err(BookingError::NotFound(id)),
        }
    }

    async fn load_live(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let r = self.load(id).await?;
        if r.is_finalized() {
            return Err(BookingError::Finalized(id));
        }
        Ok(r)
    }

    /// Both streams of one date, ordinary first, with the date's adjustments.
    async fn load_day(&self, date: NaiveDate) -> Result<(Vec<Reservation>, AdjustmentMap), BookingError> {
        let mut rs = self.reservations.list_active(date, StreamKind::Ordinary).await?;
        rs.extend(self.reservations.list_active(date, StreamKind::Event).await?);
        let adjustments = self.adjustments.get_by_date(date).await?;
        Ok((rs, adjustments))
    }

    /// Materialize everything the pipeline reads, then run it.
    async fn check(&self, candidate: &Candidate) -> Result<(), BookingError> {
        let event = match candidate.stream.event_id() {
            Some(eid) => Some(self.events.get_event(eid).await?.ok_or(BookingError::NotFound(eid))?),
            None => None,
        };
        let event_reservations = match &event {
            Some(ev) => self.reservations.list_for_event(ev.id).await?,
            None => Vec::new(),
        };

        let (prev_rs, prev_adj) = match candidate.date.pred_opt() {
            Some(prev) => (
                self.reservations
                    .list_with_status(prev, StreamKind::Ordinary, &[Status::Arrived])
                    .await?,
                self.adjustments.get_by_date(prev).await?,
            ),
            None => Default::default(),
        };
        let (same_rs, same_adj) = self.load_day(candidate.date).await?;
        let spills = candidate.interval().is_ok_and(|span| span.spills_over());
        let (next_rs, next_adj) = match candidate.date.succ_opt() {
            Some(next) if spills => self.load_day(next).await?,
            _ => Default::default(),
        };

        let ctx = ValidationContext {
            event: event.as_ref(),
            event_reservations: &event_reservations,
            schedule: Schedule {
                prev_day: DayView::new(&prev_rs, &prev_adj),
                same_day: DayView::new(&same_rs, &same_adj),
                next_day: DayView::new(&next_rs, &next_adj),
            },
        };

        let started = Instant::now();
        let outcome = validate(candidate, &ctx);
        metrics::histogram!(obs::VALIDATION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        metrics::counter!(obs::VALIDATIONS_TOTAL, "outcome" => obs::outcome_label(&outcome)).increment(1);
        if let Err(e) = &outcome {
            debug!("rejected candidate for {} on {}: {e}", candidate.guest_name, candidate.date);
        }
        outcome.map_err(BookingError::Rejected)
    }

    /// Canonical ids in entry order; blanks skipped, repeats collapsed.
    fn canonical_tables(&self, refs: &[String]) -> Result<Vec<TableId>, BookingError> {
        let mut tables: Vec<TableId> = Vec::with_capacity(refs.len());
        for text in refs.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let id = self
                .layout
                .resolve_table(text)
                .ok_or_else(|| BookingError::UnknownTable(text.to_string()))?;
            if !tables.contains(&id) {
                tables.push(id);
            }
        }
        Ok(tables)
    }

    async fn clear_adjustment(&self, date: NaiveDate, id: Ulid) -> Result<(), BookingError> {
        if self.adjustments.get_one(date, id).await?.is_some() {
            self.save_adjustment_best_effort(date, id, Adjustment::default()).await;
        }
        Ok(())
    }

    /// The reservation itself is already stored and valid with its default
    /// window, so a failed adjustment write is logged and dropped.
    async fn save_adjustment_best_effort(&self, date: NaiveDate, id: Ulid, adjustment: Adjustment) {
        if let Err(e) = self.adjustments.upsert(date, id, adjustment).await {
            metrics::counter!(obs::ADJUSTMENT_WRITE_FAILURES_TOTAL).increment(1);
            warn!("adjustment for {id} on {date} not saved, keeping estimated window: {e}");
        }
    }
}

fn slot(r: &Reservation, interval: Span, carried_over: bool) -> Slot {
    Slot {
        reservation_id: r.id,
        guest_name: r.guest_name.clone(),
        tables: r.tables.clone(),
        interval,
        carried_over,
    }
}

/// Display path: a malformed stored adjustment is reported and ignored.
fn effective_or_default(r: &Reservation, adjustments: &AdjustmentMap) -> Span {
    resolve_reservation(r, adjustments).unwrap_or_else(|e| {
        warn!("{e}; showing estimated window");
        Span::new(r.start, r.start.saturating_add(estimate_duration(r.party_size)).min(MINUTES_PER_DAY))
    })
}

fn check_limits(draft: &ReservationDraft) -> Result<(), BookingError> {
    if draft.guest_name.len() > MAX_GUEST_NAME_LEN {
        return Err(BookingError::LimitExceeded("guest name too long"));
    }
    if draft.party_size > MAX_PARTY_SIZE {
        return Err(BookingError::LimitExceeded("party too large"));
    }
    if draft.tables.len() > MAX_TABLES_PER_RESERVATION {
        return Err(BookingError::LimitExceeded("too many tables"));
    }
    if draft.tables.iter().any(|t| t.len() > MAX_TABLE_REF_LEN) {
        return Err(BookingError::LimitExceeded("table reference too long"));
    }
    if draft.code.as_ref().is_some_and(|c| c.len() > MAX_CODE_LEN) {
        return Err(BookingError::LimitExceeded("reservation code too long"));
    }
    if !(0..MINUTES_PER_DAY).contains(&draft.start) {
        return Err(BookingError::LimitExceeded("start time out of range"));
    }
    match &draft.adjustment {
        Some(adjustment) => check_adjustment_bounds(adjustment),
        None => Ok(()),
    }
}

/// An adjusted start stays on the reservation's date; an adjusted end may
/// run at most one day past it.
fn check_adjustment_bounds(adjustment: &Adjustment) -> Result<(), BookingError> {
    if adjustment.start.is_some_and(|s| !(0..MINUTES_PER_DAY).contains(&s)) {
        return Err(BookingError::LimitExceeded("adjusted start out of range"));
    }
    if adjustment.end.is_some_and(|e| !(1..=2 * MINUTES_PER_DAY).contains(&e)) {
        return Err(BookingError::LimitExceeded("adjusted end out of range"));
    }
    Ok(())
}
