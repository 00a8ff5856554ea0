//! Interval and clock helpers shared by the detector and the validator.

use chrono::{DateTime, Duration, Utc};

/// Open-interval overlap test for `[start1, end1)` and `[start2, end2)`.
///
/// Touching endpoints do not overlap.
#[inline]
pub fn time_ranges_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// `start + duration`, or `None` past the representable range.
#[inline]
pub fn end_after(start: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    start.checked_add_signed(duration)
}

/// `start + duration`, saturating at the representable range.
#[inline]
pub fn saturating_add(start: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    start.checked_add_signed(duration).unwrap_or(if duration < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// `time - duration`, saturating at the representable range.
#[inline]
pub fn saturating_sub(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    time.checked_sub_signed(duration).unwrap_or(if duration < Duration::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// Snap a timestamp to the nearest multiple of `minutes`, halves rounding up.
///
/// `minutes == 0` leaves the timestamp untouched.
pub fn round_to_nearest_minutes(time: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    if minutes == 0 {
        return time;
    }

    let step_ms = i64::from(minutes) * 60_000;
    let ms = time.timestamp_millis();
    let quotient = ms.div_euclid(step_ms);
    let remainder = ms.rem_euclid(step_ms);
    let steps = if remainder * 2 >= step_ms {
        quotient + 1
    } else {
        quotient
    };

    steps
        .checked_mul(step_ms)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(time)
}
