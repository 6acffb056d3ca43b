use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

/// No 0/O or 1/I, so codes survive being read over the phone.
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const SUFFIX_LEN: usize = 6;

/// `EVT-{year}-{6 chars}` for an event reservation on `date`. Uniqueness is
/// enforced by the store; on a collision the caller draws again.
pub fn generate_reservation_code(date: NaiveDate) -> String {
    let mut bits = Ulid::new().random();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let c = ALPHABET[(bits & 0x1f) as usize] as char;
            bits >>= 5;
            c
        })
        .collect();
    format!("EVT-{}-{suffix}", date.year())
}
