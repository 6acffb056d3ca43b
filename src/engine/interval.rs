use ulid::Ulid;

use crate::model::*;

use super::ValidationError;

// ── Duration, interval and spillover ─────────────────────────────

/// Default occupancy for a party when no explicit end is known.
pub fn estimate_duration(party_size: u32) -> Minute {
    match party_size {
        0..=2 => 60,
        3..=4 => 120,
        _ => 150,
    }
}

/// Effective `[start, end)` of a reservation on its own date.
///
/// Adjustment values are taken verbatim. Without an adjusted end, the
/// estimated end is clamped to midnight: only an explicit override can
/// spill into the next date.
pub fn resolve_interval(
    nominal_start: Minute,
    party_size: u32,
    adjustment: Option<&Adjustment>,
) -> Result<Span, ValidationError> {
    resolve_for(None, nominal_start, party_size, adjustment)
}

pub(crate) fn resolve_reservation(
    reservation: &Reservation,
    adjustments: &AdjustmentMap,
) -> Result<Span, ValidationError> {
    resolve_for(
        Some(reservation.id),
        reservation.start,
        reservation.party_size,
        adjustments.get(&reservation.id),
    )
}

fn resolve_for(
    reservation_id: Option<Ulid>,
    nominal_start: Minute,
    party_size: u32,
    adjustment: Option<&Adjustment>,
) -> Result<Span, ValidationError> {
    let start = adjustment.and_then(|a| a.start).unwrap_or(nominal_start);
    let end = match adjustment.and_then(|a| a.end) {
        Some(end) => end,
        None => start.saturating_add(estimate_duration(party_size)).min(MINUTES_PER_DAY),
    };
    checked_span(reservation_id, start, end)
}

/// Build a span from caller-supplied bounds, rejecting empty or inverted ones.
pub(crate) fn checked_span(
    reservation_id: Option<Ulid>,
    start: Minute,
    end: Minute,
) -> Result<Span, ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidAdjustment {
            reservation_id,
            start,
            end,
        });
    }
    Ok(Span::new(start, end))
}

/// The part of `span` that lands on the following date, rebased to that
/// date's midnight.
pub fn translate_for_next_day(span: &Span) -> Option<Span> {
    if span.end > MINUTES_PER_DAY {
        Some(Span::new(0, (span.end - MINUTES_PER_DAY).min(MINUTES_PER_DAY)))
    } else {
        None
    }
}
