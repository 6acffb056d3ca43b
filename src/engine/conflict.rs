use std::sync::LazyLock;

use ulid::Ulid;

use crate::model::*;

use super::interval::{resolve_reservation, translate_for_next_day};
use super::{Conflict, ConflictKind, ValidationError};

static NO_ADJUSTMENTS: LazyLock<AdjustmentMap> = LazyLock::new(AdjustmentMap::new);

/// Reservations of one date (both streams) with that date's adjustments.
#[derive(Debug, Clone, Copy)]
pub struct DayView<'a> {
    pub reservations: &'a [Reservation],
    pub adjustments: &'a AdjustmentMap,
}

impl<'a> DayView<'a> {
    pub fn new(reservations: &'a [Reservation], adjustments: &'a AdjustmentMap) -> Self {
        Self {
            reservations,
            adjustments,
        }
    }

    pub fn empty() -> DayView<'static> {
        DayView {
            reservations: &[],
            adjustments: &NO_ADJUSTMENTS,
        }
    }
}

impl Default for DayView<'_> {
    fn default() -> Self {
        DayView::empty()
    }
}

/// Everything the conflict scan reads around a candidate's date D.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schedule<'a> {
    /// D−1: source of spillover into D.
    pub prev_day: DayView<'a>,
    pub same_day: DayView<'a>,
    /// D+1: only consulted when the candidate itself runs past midnight.
    pub next_day: DayView<'a>,
}

/// One table of a candidate, with the window the candidate wants on it.
#[derive(Debug, Clone, Copy)]
pub struct TableProbe<'a> {
    /// Set when editing an existing reservation so it never blocks itself.
    pub id: Option<Ulid>,
    pub table: &'a TableId,
    pub interval: Span,
}

/// A previous-day reservation carries over past midnight only while its
/// ordinary-stream party is actually seated. A booked party that never
/// checked in is assumed not to materialize after midnight.
pub fn is_spillover_blocker(reservation: &Reservation) -> bool {
    reservation.stream.kind() == StreamKind::Ordinary && reservation.is_physically_occupied()
}

/// First reservation that blocks `probe`, scanning the previous day's
/// spillover, then the same day, then (for a candidate that itself runs past
/// midnight) the next day. Touching windows do not conflict.
pub fn find_conflict(
    probe: &TableProbe<'_>,
    schedule: &Schedule<'_>,
) -> Result<Option<Conflict>, ValidationError> {
    let prev = schedule.prev_day;
    for r in prev.reservations {
        if !is_candidate_neighbor(probe, r) || !is_spillover_blocker(r) {
            continue;
        }
        let span = resolve_reservation(r, prev.adjustments)?;
        if let Some(spill) = translate_for_next_day(&span)
            && spill.overlaps(&probe.interval)
        {
            return Ok(Some(conflict(probe, r, spill, ConflictKind::Spillover)));
        }
    }

    let same = schedule.same_day;
    for r in same.reservations {
        if !is_candidate_neighbor(probe, r) || !r.is_booking_active() {
            continue;
        }
        let span = resolve_reservation(r, same.adjustments)?;
        if span.overlaps(&probe.interval) {
            return Ok(Some(conflict(probe, r, span, ConflictKind::SameDay)));
        }
    }

    if let Some(own_spill) = translate_for_next_day(&probe.interval) {
        let next = schedule.next_day;
        for r in next.reservations {
            if !is_candidate_neighbor(probe, r) || !r.is_booking_active() {
                continue;
            }
            let span = resolve_reservation(r, next.adjustments)?;
            if span.overlaps(&own_spill) {
                return Ok(Some(conflict(probe, r, span, ConflictKind::NextDay)));
            }
        }
    }

    Ok(None)
}

/// Shares the probed table and is not the candidate itself.
fn is_candidate_neighbor(probe: &TableProbe<'_>, r: &Reservation) -> bool {
    probe.id != Some(r.id) && r.uses_table(probe.table)
}

fn conflict(probe: &TableProbe<'_>, r: &Reservation, interval: Span, kind: ConflictKind) -> Conflict {
    Conflict {
        table: probe.table.clone(),
        reservation_id: r.id,
        guest_name: r.guest_name.clone(),
        interval,
        kind,
    }
}
