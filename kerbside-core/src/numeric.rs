//! Small numeric helpers shared by the workflows and reports.

use std::time::Duration;

use chrono::TimeDelta;

/// Convert a count into a float for averaging.
#[expect(
    clippy::cast_precision_loss,
    reason = "counts stay far below 2^52 in practice"
)]
pub(crate) fn count_to_f64(count: usize) -> f64 {
    count as f64
}

/// `round(100 * part / whole)` with halves rounded up; 0 when `whole` is 0.
pub(crate) fn percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole);
    let rounded = (part * 200 + whole) / (whole * 2);
    u8::try_from(rounded).unwrap_or(100)
}

/// Round to two decimal places.
pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Arithmetic mean, `None` for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count_to_f64(count))
}

/// Whole minutes in `delta`, rounded to the nearest minute.
pub(crate) fn rounded_minutes(delta: TimeDelta) -> i64 {
    (delta.num_seconds() + 30).div_euclid(60)
}

/// Fractional minutes in `delta`.
#[expect(
    clippy::cast_precision_loss,
    reason = "durations in milliseconds stay far below 2^52"
)]
pub(crate) fn minutes_f64(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 60_000.0
}

/// Time span of `minutes` fractional minutes; zero for negative or absurd inputs.
pub(crate) fn span_of_minutes(minutes: f64) -> TimeDelta {
    Duration::try_from_secs_f64(minutes * 60.0)
        .ok()
        .and_then(|span| TimeDelta::from_std(span).ok())
        .unwrap_or_default()
}
