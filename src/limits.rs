// Input and resource limits. Checked at the booking boundary before any
// store read, so oversized requests never reach the engine.

pub const MAX_GUEST_NAME_LEN: usize = 200;
pub const MAX_CODE_LEN: usize = 64;
pub const MAX_TABLES_PER_RESERVATION: usize = 32;
pub const MAX_PARTY_SIZE: u32 = 10_000;
pub const MAX_TABLE_REF_LEN: usize = 64;

pub const MAX_VENUES: usize = 1024;
pub const MAX_VENUE_NAME_LEN: usize = 200;

/// Any single WAL record larger than this is treated as corruption.
pub const MAX_WAL_RECORD_LEN: usize = 1 << 20;
