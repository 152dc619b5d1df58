use crate::model::Ms;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Upper bound on slots accepted by a single publish call (one WAL record).
pub const MAX_SLOTS_PER_PUBLISH: usize = 10_000;
pub const MAX_SLOTS_PER_PROVIDER: usize = 1_000_000;
pub const MAX_NAME_LEN: usize = 256;
