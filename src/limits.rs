use crate::model::{DAY_MS, Ms};

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Longest single booking or blackout.
pub const MAX_BOOKING_DURATION_MS: Ms = 7 * DAY_MS;
pub const MAX_BLACKOUT_DURATION_MS: Ms = 366 * DAY_MS;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 128;
pub const MAX_NOTES_LEN: usize = 2048;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_SUBJECT_LEN: usize = 256;
