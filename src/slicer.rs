use crate::limits::{MAX_SLOTS_PER_PUBLISH, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::Ms;

/// Added to the rounded-down end so a slot starting exactly on it is kept.
pub const END_EPSILON_MS: Ms = 1;

/// The window cannot hold a single full slot once aligned, or lies outside
/// the supported timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTimeRange {
    pub start: Ms,
    pub end: Ms,
    pub interval_ms: Ms,
}

impl std::fmt::Display for InvalidTimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid time range [{}, {}): end must be at least {}ms after start once aligned",
            self.start, self.end, self.interval_ms
        )
    }
}

impl std::error::Error for InvalidTimeRange {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceError {
    InvalidTimeRange(InvalidTimeRange),
    /// The window is valid but yields more slots than one publish accepts.
    TooManySlots { count: u64, max: usize },
}

impl std::fmt::Display for SliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceError::InvalidTimeRange(e) => write!(f, "{e}"),
            SliceError::TooManySlots { count, max } => {
                write!(f, "window yields {count} slots, at most {max} allowed")
            }
        }
    }
}

impl std::error::Error for SliceError {}

/// Callers keep `t` within the valid timestamp range.
pub fn round_down(t: Ms, interval_ms: Ms) -> Ms {
    t - t.rem_euclid(interval_ms)
}

/// Next boundary strictly after the boundary at or below `t`, so an aligned
/// `t` moves forward by one full interval.
pub fn round_up(t: Ms, interval_ms: Ms) -> Ms {
    round_down(t, interval_ms) + interval_ms
}

/// Slice `[start, end]` into slot start instants aligned to `interval_ms`
/// boundaries (measured from the Unix epoch).
///
/// The slot count is checked before anything is allocated.
pub fn generate_slots(start: Ms, end: Ms, interval_ms: Ms) -> Result<Vec<Ms>, SliceError> {
    let invalid = SliceError::InvalidTimeRange(InvalidTimeRange {
        start,
        end,
        interval_ms,
    });
    let valid = MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS;
    if interval_ms <= 0 || !valid.contains(&start) || !valid.contains(&end) {
        return Err(invalid);
    }
    let first = round_down(start, interval_ms)
        .checked_add(interval_ms)
        .ok_or(invalid)?;
    let last = round_down(end, interval_ms) + END_EPSILON_MS;
    // Both ends are non-negative here, so the difference cannot overflow.
    let width = last - first;
    if width < interval_ms {
        return Err(invalid);
    }

    let count = ((width - 1) / interval_ms + 1) as u64;
    if count > MAX_SLOTS_PER_PUBLISH as u64 {
        return Err(SliceError::TooManySlots {
            count,
            max: MAX_SLOTS_PER_PUBLISH,
        });
    }
    Ok((0..count as Ms).map(|i| first + i * interval_ms).collect())
}
