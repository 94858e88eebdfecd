use chrono::NaiveDate;

use crate::model::*;

use super::EngineError;

// ── Opening hours ────────────────────────────────────────────────

/// Maps a calendar day to its bookable window. The window must lie inside that day.
pub trait OpeningPolicy: Send + Sync {
    fn window_for(&self, day: NaiveDate) -> TimeRange;
}

/// Same hours every day, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHours {
    open_hour: u8,
    close_hour: u8,
}

impl Default for FixedHours {
    /// `[08:00, 22:00)`.
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 22,
        }
    }
}

impl FixedHours {
    pub fn new(open_hour: u8, close_hour: u8) -> Result<Self, EngineError> {
        if close_hour > 24 {
            return Err(EngineError::invalid(
                "close_hour",
                format!("{close_hour} is past the end of the day"),
            ));
        }
        if open_hour >= close_hour {
            return Err(EngineError::invalid(
                "open_hour",
                format!("{open_hour} must be before close_hour {close_hour}"),
            ));
        }
        Ok(Self {
            open_hour,
            close_hour,
        })
    }
}

impl OpeningPolicy for FixedHours {
    fn window_for(&self, day: NaiveDate) -> TimeRange {
        let midnight = day_start(day);
        TimeRange::from_bounds(
            midnight + self.open_hour as Ms * HOUR_MS,
            midnight + self.close_hour as Ms * HOUR_MS,
        )
    }
}

// ── Free-slot sweep ──────────────────────────────────────────────

/// Subtract `occupied` from `window`, keeping only gaps of at least `min_duration_ms`.
///
/// `occupied` may be unsorted, overlapping, or extend past the window.
/// The result is sorted and pairwise disjoint.
pub fn compute_free_slots(
    window: &TimeRange,
    occupied: &[TimeRange],
    min_duration_ms: Ms,
) -> Result<Vec<TimeRange>, EngineError> {
    if min_duration_ms <= 0 {
        return Err(EngineError::InvalidDuration(min_duration_ms));
    }

    let mut blocks: Vec<TimeRange> = occupied
        .iter()
        .filter_map(|b| b.clamp_to(window))
        .collect();
    blocks.sort();

    let mut free = Vec::new();
    let mut cursor = window.start();

    for block in &blocks {
        if block.start() > cursor && block.start() - cursor >= min_duration_ms {
            free.push(TimeRange::from_bounds(cursor, block.start()));
        }
        // Cursor only moves forward, so overlapping blocks never regress it.
        cursor = cursor.max(block.end());
    }

    if window.end() - cursor >= min_duration_ms {
        free.push(TimeRange::from_bounds(cursor, window.end()));
    }

    Ok(free)
}
