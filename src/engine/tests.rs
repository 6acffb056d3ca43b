use chrono::NaiveDate;
use ulid::Ulid;

use super::*;
use crate::model::*;

const H: Minute = 60;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn t(id: &str) -> TableId {
    TableId::new(id)
}

fn reservation(date: NaiveDate, start: Minute, party: u32, table: &str, guest: &str) -> Reservation {
    Reservation {
        id: Ulid::new(),
        date,
        start,
        party_size: party,
        tables: vec![t(table)],
        guest_name: guest.into(),
        status: Status::Booked,
        cleared: false,
        stream: Stream::Ordinary,
        code: None,
        zone_id: None,
        deleted: false,
    }
}

fn seated(mut r: Reservation) -> Reservation {
    r.status = Status::Arrived;
    r
}

fn candidate(date: NaiveDate, start: Minute, party: u32, tables: &[&str]) -> Candidate {
    Candidate {
        id: None,
        date,
        start,
        party_size: party,
        tables: tables.iter().map(|s| t(s)).collect(),
        guest_name: "Marko".into(),
        stream: Stream::Ordinary,
        code: None,
        adjustment: None,
    }
}

fn event(capacity: Option<u32>) -> Event {
    Event {
        id: Ulid::new(),
        name: "Jazz night".into(),
        date: day(14),
        end_date: None,
        start: 20 * H,
        end: 23 * H,
        capacity,
    }
}

fn event_reservation(ev: &Event, party: u32, table: &str) -> Reservation {
    let mut r = reservation(ev.date, 20 * H, party, table, "Guest");
    r.stream = Stream::Event { event_id: ev.id };
    r.code = Some("EVT-2025-ABCDEF".into());
    r
}

fn event_candidate(ev: &Event, start: Minute, party: u32, tables: &[&str]) -> Candidate {
    let mut c = candidate(ev.date, start, party, tables);
    c.stream = Stream::Event { event_id: ev.id };
    c.code = Some("EVT-2025-QWERTY".into());
    c
}

fn same_day_ctx<'a>(reservations: &'a [Reservation], adjustments: &'a AdjustmentMap) -> ValidationContext<'a> {
    ValidationContext {
        schedule: Schedule {
            same_day: DayView::new(reservations, adjustments),
            ..Schedule::default()
        },
        ..ValidationContext::default()
    }
}

// ── Input shape ──────────────────────────────────────────

#[test]
fn blank_guest_name_rejected_first() {
    let mut c = candidate(day(14), 19 * H, 0, &["t1"]);
    c.guest_name = "   ".into();
    assert_eq!(
        validate(&c, &ValidationContext::default()),
        Err(ValidationError::MissingGuestName)
    );
}

#[test]
fn zero_guests_rejected() {
    let c = candidate(day(14), 19 * H, 0, &["t1"]);
    assert_eq!(
        validate(&c, &ValidationContext::default()),
        Err(ValidationError::InvalidGuestCount)
    );
}

#[test]
fn empty_day_accepts() {
    let c = candidate(day(14), 19 * H, 2, &["t1"]);
    assert_eq!(validate(&c, &ValidationContext::default()), Ok(()));
}

// ── Same-day conflicts ───────────────────────────────────

#[test]
fn touching_intervals_do_not_conflict() {
    let existing = vec![reservation(day(14), 19 * H, 2, "T", "Ana")];
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 20 * H, 2, &["T"]);
    assert_eq!(validate(&c, &same_day_ctx(&existing, &adj)), Ok(()));
}

#[test]
fn overlapping_intervals_conflict() {
    let existing = vec![reservation(day(14), 19 * H, 3, "T", "Ana")];
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 20 * H, 2, &["T"]);
    match validate(&c, &same_day_ctx(&existing, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => {
            assert_eq!(conflict.table, t("T"));
            assert_eq!(conflict.guest_name, "Ana");
            assert_eq!(conflict.reservation_id, existing[0].id);
            assert_eq!(conflict.interval, Span::new(19 * H, 21 * H));
            assert_eq!(conflict.kind, ConflictKind::SameDay);
        }
        other => panic!("expected table conflict, got {other:?}"),
    }
}

#[test]
fn other_tables_do_not_conflict() {
    let existing = vec![reservation(day(14), 19 * H, 3, "T", "Ana")];
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 19 * H, 2, &["U"]);
    assert_eq!(validate(&c, &same_day_ctx(&existing, &adj)), Ok(()));
}

#[test]
fn finalized_reservations_do_not_block() {
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 19 * H, 2, &["T"]);

    let mut cancelled = reservation(day(14), 19 * H, 2, "T", "Ana");
    cancelled.status = Status::Cancelled;
    let mut no_show = reservation(day(14), 19 * H, 2, "T", "Ivo");
    no_show.status = Status::NotArrived;
    let mut left = seated(reservation(day(14), 19 * H, 2, "T", "Eva"));
    left.cleared = true;
    let mut deleted = reservation(day(14), 19 * H, 2, "T", "Uma");
    deleted.deleted = true;

    let existing = vec![cancelled, no_show, left, deleted];
    assert_eq!(validate(&c, &same_day_ctx(&existing, &adj)), Ok(()));
}

#[test]
fn seated_and_booked_both_block_same_day() {
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 19 * H + 30, 2, &["T"]);
    for existing in [
        reservation(day(14), 19 * H, 2, "T", "Ana"),
        seated(reservation(day(14), 19 * H, 2, "T", "Ana")),
    ] {
        let existing = vec![existing];
        assert!(matches!(
            validate(&c, &same_day_ctx(&existing, &adj)),
            Err(ValidationError::TableConflict(_))
        ));
    }
}

#[test]
fn event_stream_reservations_block_ordinary_candidates() {
    let ev = event(None);
    let existing = vec![event_reservation(&ev, 4, "T")];
    let adj = AdjustmentMap::new();
    let c = candidate(ev.date, 21 * H, 2, &["T"]);
    assert!(matches!(
        validate(&c, &same_day_ctx(&existing, &adj)),
        Err(ValidationError::TableConflict(_))
    ));
}

#[test]
fn adjustment_of_existing_reservation_is_honored() {
    let existing = vec![reservation(day(14), 19 * H, 2, "T", "Ana")];
    let mut adj = AdjustmentMap::new();
    // Default would be 19:00-20:00; the override ends at 21:30.
    adj.insert(existing[0].id, Adjustment::new(None, Some(21 * H + 30)));
    let c = candidate(day(14), 21 * H, 2, &["T"]);
    match validate(&c, &same_day_ctx(&existing, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => {
            assert_eq!(conflict.interval, Span::new(19 * H, 21 * H + 30));
        }
        other => panic!("expected table conflict, got {other:?}"),
    }

    let later = candidate(day(14), 21 * H + 30, 2, &["T"]);
    assert_eq!(validate(&later, &same_day_ctx(&existing, &adj)), Ok(()));
}

#[test]
fn edit_does_not_conflict_with_itself() {
    let existing = vec![reservation(day(14), 19 * H, 3, "T", "Ana")];
    let adj = AdjustmentMap::new();
    let mut c = candidate(day(14), 19 * H + 30, 3, &["T"]);
    c.id = Some(existing[0].id);
    assert_eq!(validate(&c, &same_day_ctx(&existing, &adj)), Ok(()));
}

#[test]
fn first_conflict_follows_table_order() {
    let existing = vec![
        reservation(day(14), 19 * H, 2, "A", "Ana"),
        reservation(day(14), 19 * H, 2, "B", "Bob"),
    ];
    let adj = AdjustmentMap::new();

    let c = candidate(day(14), 19 * H, 2, &["B", "A"]);
    match validate(&c, &same_day_ctx(&existing, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => assert_eq!(conflict.guest_name, "Bob"),
        other => panic!("expected table conflict, got {other:?}"),
    }

    let c = candidate(day(14), 19 * H, 2, &["A", "B"]);
    match validate(&c, &same_day_ctx(&existing, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => assert_eq!(conflict.guest_name, "Ana"),
        other => panic!("expected table conflict, got {other:?}"),
    }
}

#[test]
fn first_conflict_follows_scan_order_within_table() {
    let existing = vec![
        reservation(day(14), 20 * H, 2, "T", "Later"),
        reservation(day(14), 19 * H, 3, "T", "Earlier"),
    ];
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 20 * H, 2, &["T"]);
    match validate(&c, &same_day_ctx(&existing, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => assert_eq!(conflict.guest_name, "Later"),
        other => panic!("expected table conflict, got {other:?}"),
    }
}

#[test]
fn malformed_stored_adjustment_is_a_data_error() {
    let existing = vec![reservation(day(14), 19 * H, 2, "T", "Ana")];
    let mut adj = AdjustmentMap::new();
    adj.insert(existing[0].id, Adjustment::new(Some(20 * H), Some(19 * H)));
    let c = candidate(day(14), 12 * H, 2, &["T"]);
    assert_eq!(
        validate(&c, &same_day_ctx(&existing, &adj)),
        Err(ValidationError::InvalidAdjustment {
            reservation_id: Some(existing[0].id),
            start: 20 * H,
            end: 19 * H,
        })
    );
}

#[test]
fn malformed_candidate_adjustment_rejected() {
    let mut c = candidate(day(14), 19 * H, 2, &["T"]);
    c.adjustment = Some(Adjustment::new(Some(19 * H), Some(18 * H)));
    assert!(matches!(
        validate(&c, &ValidationContext::default()),
        Err(ValidationError::InvalidAdjustment { reservation_id: None, .. })
    ));
}

// ── Spillover ────────────────────────────────────────────

fn late_seated_party() -> (Vec<Reservation>, AdjustmentMap) {
    // 23:30, party of six: 150 minutes clipped to midnight, then extended
    // to 01:00 on the next day.
    let r = seated(reservation(day(13), 23 * H + 30, 6, "T", "Late"));
    let mut adj = AdjustmentMap::new();
    adj.insert(r.id, Adjustment::new(None, Some(1500)));
    (vec![r], adj)
}

fn prev_day_ctx<'a>(reservations: &'a [Reservation], adjustments: &'a AdjustmentMap) -> ValidationContext<'a> {
    ValidationContext {
        schedule: Schedule {
            prev_day: DayView::new(reservations, adjustments),
            ..Schedule::default()
        },
        ..ValidationContext::default()
    }
}

#[test]
fn spillover_blocks_early_next_day_slot() {
    let (prev, adj) = late_seated_party();
    let c = candidate(day(14), 30, 2, &["T"]);
    match validate(&c, &prev_day_ctx(&prev, &adj)) {
        Err(ValidationError::TableConflict(conflict)) => {
            assert_eq!(conflict.kind, ConflictKind::Spillover);
            assert_eq!(conflict.interval, Span::new(0, 60));
            assert_eq!(conflict.guest_name, "Late");
        }
        other => panic!("expected spillover conflict, got {other:?}"),
    }
}

#[test]
fn spillover_touching_boundary_accepted() {
    let (prev, adj) = late_seated_party();
    let c = candidate(day(14), 60, 2, &["T"]);
    assert_eq!(validate(&c, &prev_day_ctx(&prev, &adj)), Ok(()));
}

#[test]
fn unadjusted_late_party_does_not_spill() {
    let prev = vec![seated(reservation(day(13), 23 * H + 30, 6, "T", "Late"))];
    let adj = AdjustmentMap::new();
    let c = candidate(day(14), 0, 2, &["T"]);
    assert_eq!(validate(&c, &prev_day_ctx(&prev, &adj)), Ok(()));
}

#[test]
fn booked_prior_day_party_does_not_spill() {
    let (mut prev, adj) = late_seated_party();
    prev[0].status = Status::Booked;
    let c = candidate(day(14), 30, 2, &["T"]);
    assert_eq!(validate(&c, &prev_day_ctx(&prev, &adj)), Ok(()));
}

#[test]
fn cleared_prior_day_party_does_not_spill() {
    let (mut prev, adj) = late_seated_party();
    prev[0].cleared = true;
    let c = candidate(day(14), 30, 2, &["T"]);
    assert_eq!(validate(&c, &prev_day_ctx(&prev, &adj)), Ok(()));
}

#[test]
fn event_stream_prior_day_party_does_not_spill() {
    let (mut prev, adj) = late_seated_party();
    prev[0].stream = Stream::Event { event_id: Ulid::new() };
    let c = candidate(day(14), 30, 2, &["T"]);
    assert_eq!(validate(&c, &prev_day_ctx(&prev, &adj)), Ok(()));
}

#[test]
fn spillover_reported_before_same_day() {
    let (prev, prev_adj) = late_seated_party();
    let same = vec![reservation(day(14), 0, 2, "T", "Early")];
    let same_adj = AdjustmentMap::new();
    let ctx = ValidationContext {
        schedule: Schedule {
            prev_day: DayView::new(&prev, &prev_adj),
            same_day: DayView::new(&same, &same_adj),
            next_day: DayView::empty(),
        },
        ..ValidationContext::default()
    };
    let c = candidate(day(14), 30, 2, &["T"]);
    match validate(&c, &ctx) {
        Err(ValidationError::TableConflict(conflict)) => assert_eq!(conflict.kind, ConflictKind::Spillover),
        other => panic!("expected spillover conflict, got {other:?}"),
    }
}

#[test]
fn candidate_running_past_midnight_checks_next_day() {
    let next = vec![reservation(day(15), 30, 2, "T", "Breakfast")];
    let adj = AdjustmentMap::new();
    let ctx = ValidationContext {
        schedule: Schedule {
            next_day: DayView::new(&next, &adj),
            ..Schedule::default()
        },
        ..ValidationContext::default()
    };

    let mut c = candidate(day(14), 23 * H, 2, &["T"]);
    c.adjustment = Some(Adjustment::new(None, Some(1500)));
    match validate(&c, &ctx) {
        Err(ValidationError::TableConflict(conflict)) => {
            assert_eq!(conflict.kind, ConflictKind::NextDay);
            assert_eq!(conflict.interval, Span::new(30, 90));
        }
        other => panic!("expected next-day conflict, got {other:?}"),
    }

    // Ending at 00:30 only touches the next-day booking.
    c.adjustment = Some(Adjustment::new(None, Some(1470)));
    assert_eq!(validate(&c, &ctx), Ok(()));
}

#[test]
fn find_conflict_directly() {
    let existing = vec![reservation(day(14), 19 * H, 2, "T", "Ana")];
    let adj = AdjustmentMap::new();
    let schedule = Schedule {
        same_day: DayView::new(&existing, &adj),
        ..Schedule::default()
    };
    let table = t("T");
    let hit = TableProbe {
        id: None,
        table: &table,
        interval: Span::new(19 * H + 59, 21 * H),
    };
    assert!(find_conflict(&hit, &schedule).unwrap().is_some());
    let miss = TableProbe {
        interval: Span::new(18 * H, 19 * H),
        ..hit
    };
    assert!(find_conflict(&miss, &schedule).unwrap().is_none());
}

// ── Capacity ─────────────────────────────────────────────

fn capacity_fixture(ev: &Event) -> Vec<Reservation> {
    // 48 seats taken, plus a cancelled party that must not count.
    let mut rs: Vec<Reservation> = (0..12).map(|i| event_reservation(ev, 4, &format!("e{i}"))).collect();
    let mut cancelled = event_reservation(ev, 10, "x");
    cancelled.status = Status::Cancelled;
    rs.push(cancelled);
    rs
}

#[test]
fn capacity_exceeded_reports_remaining() {
    let ev = event(Some(50));
    let rs = capacity_fixture(&ev);
    let ctx = ValidationContext {
        event: Some(&ev),
        event_reservations: &rs,
        ..ValidationContext::default()
    };

    let c = event_candidate(&ev, 20 * H, 3, &[]);
    assert_eq!(
        validate(&c, &ctx),
        Err(ValidationError::CapacityExceeded {
            capacity: 50,
            remaining: 2
        })
    );

    let c = event_candidate(&ev, 20 * H, 2, &[]);
    assert_eq!(validate(&c, &ctx), Ok(()));
}

#[test]
fn capacity_excludes_own_prior_self() {
    let ev = event(Some(50));
    let rs = capacity_fixture(&ev);
    let ctx = ValidationContext {
        event: Some(&ev),
        event_reservations: &rs,
        ..ValidationContext::default()
    };
    // Growing an existing party of four to six needs only two more seats.
    let mut c = event_candidate(&ev, 20 * H, 6, &[]);
    c.id = Some(rs[0].id);
    assert_eq!(validate(&c, &ctx), Ok(()));
}

#[test]
fn capacity_ignores_other_events() {
    let ev = event(Some(5));
    let other = event(Some(5));
    let rs = vec![event_reservation(&other, 5, "t1")];
    let ctx = ValidationContext {
        event: Some(&ev),
        event_reservations: &rs,
        ..ValidationContext::default()
    };
    assert_eq!(validate(&event_candidate(&ev, 20 * H, 5, &[]), &ctx), Ok(()));
}

#[test]
fn zero_capacity_means_unlimited() {
    let ev = event(Some(0));
    let rs = capacity_fixture(&ev);
    let ctx = ValidationContext {
        event: Some(&ev),
        event_reservations: &rs,
        ..ValidationContext::default()
    };
    assert_eq!(validate(&event_candidate(&ev, 20 * H, 2, &[]), &ctx), Ok(()));
}

#[test]
fn capacity_checked_before_tables() {
    let ev = event(Some(2));
    let existing = vec![event_reservation(&ev, 2, "T")];
    let adj = AdjustmentMap::new();
    let ctx = ValidationContext {
        event: Some(&ev),
        event_reservations: &existing,
        schedule: Schedule {
            same_day: DayView::new(&existing, &adj),
            ..Schedule::default()
        },
    };
    assert!(matches!(
        validate(&event_candidate(&ev, 20 * H, 2, &["T"]), &ctx),
        Err(ValidationError::CapacityExceeded { remaining: 0, .. })
    ));
}

// ── Event window and code ────────────────────────────────

#[test]
fn single_day_event_requires_start_before_end() {
    let ev = event(None);
    let ctx = ValidationContext {
        event: Some(&ev),
        ..ValidationContext::default()
    };
    assert_eq!(validate(&event_candidate(&ev, 22 * H + 59, 2, &[]), &ctx), Ok(()));
    assert!(matches!(
        validate(&event_candidate(&ev, 23 * H, 2, &[]), &ctx),
        Err(ValidationError::EventWindowViolation { .. })
    ));
}

#[test]
fn single_day_event_ending_at_midnight() {
    let mut ev = event(None);
    ev.end = 0;
    let ctx = ValidationContext {
        event: Some(&ev),
        ..ValidationContext::default()
    };
    assert_eq!(validate(&event_candidate(&ev, 23 * H + 45, 2, &[]), &ctx), Ok(()));
}

#[test]
fn multi_day_event_rejects_arrival_before_start_on_first_day() {
    let mut ev = event(None);
    ev.end_date = Some(day(15));
    ev.end = H;
    let ctx = ValidationContext {
        event: Some(&ev),
        ..ValidationContext::default()
    };
    assert!(matches!(
        validate(&event_candidate(&ev, 19 * H, 2, &[]), &ctx),
        Err(ValidationError::EventWindowViolation { .. })
    ));
    assert_eq!(validate(&event_candidate(&ev, 23 * H, 2, &[]), &ctx), Ok(()));

    let mut next_day = event_candidate(&ev, 30, 2, &[]);
    next_day.date = day(15);
    assert_eq!(validate(&next_day, &ctx), Ok(()));
}

#[test]
fn event_candidate_needs_code() {
    let ev = event(None);
    let ctx = ValidationContext {
        event: Some(&ev),
        ..ValidationContext::default()
    };
    let mut c = event_candidate(&ev, 20 * H, 2, &[]);
    c.code = Some("  ".into());
    assert_eq!(validate(&c, &ctx), Err(ValidationError::MissingReservationCode));
    c.code = None;
    assert_eq!(validate(&c, &ctx), Err(ValidationError::MissingReservationCode));
}

#[test]
fn window_checked_before_code() {
    let ev = event(None);
    let ctx = ValidationContext {
        event: Some(&ev),
        ..ValidationContext::default()
    };
    let mut c = event_candidate(&ev, 23 * H + 30, 2, &[]);
    c.code = None;
    assert!(matches!(
        validate(&c, &ctx),
        Err(ValidationError::EventWindowViolation { .. })
    ));
}

#[test]
fn ordinary_candidate_needs_no_code() {
    let c = candidate(day(14), 19 * H, 2, &["T"]);
    assert_eq!(c.code, None);
    assert_eq!(validate(&c, &ValidationContext::default()), Ok(()));
}

// ── Properties ───────────────────────────────────────────

#[test]
fn validate_is_idempotent() {
    let (prev, prev_adj) = late_seated_party();
    let same = vec![reservation(day(14), 19 * H, 3, "T", "Ana")];
    let same_adj = AdjustmentMap::new();
    let ctx = ValidationContext {
        schedule: Schedule {
            prev_day: DayView::new(&prev, &prev_adj),
            same_day: DayView::new(&same, &same_adj),
            next_day: DayView::empty(),
        },
        ..ValidationContext::default()
    };
    for start in [30, 60, 19 * H, 20 * H, 21 * H] {
        let c = candidate(day(14), start, 2, &["T"]);
        assert_eq!(validate(&c, &ctx), validate(&c, &ctx));
    }
}

#[test]
fn accepted_candidates_never_overlap_active_neighbors() {
    let same = vec![
        reservation(day(14), 12 * H, 4, "T", "Lunch"),
        seated(reservation(day(14), 18 * H, 2, "T", "Early dinner")),
        reservation(day(14), 21 * H, 6, "T", "Late dinner"),
    ];
    let adj = AdjustmentMap::new();
    let ctx = same_day_ctx(&same, &adj);
    for start in (0..MINUTES_PER_DAY).step_by(15) {
        for party in [1, 3, 5] {
            let c = candidate(day(14), start, party, &["T"]);
            let mine = c.interval().unwrap();
            let clash = same
                .iter()
                .any(|r| resolve_interval(r.start, r.party_size, None).unwrap().overlaps(&mine));
            assert_eq!(validate(&c, &ctx).is_ok(), !clash, "start {start} party {party}");
        }
    }
}
