//! Field-level sanitization for raw source values.
//!
//! This is the only place the dataset's number format and "no reading" policy
//! live. Anything that turns a raw column value into a measurement goes through
//! [`sanitize`].

use crate::constants::{SENTINEL_TOLERANCE, SENTINEL_VALUE};

/// Parse a raw field value into a measurement.
///
/// Returns `None` for missing, blank, non-numeric, non-finite and sentinel
/// values. Comma decimal separators are accepted (`"12,5"` is `12.5`).
pub fn sanitize(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = trimmed.replace(',', ".");
    let value: f64 = normalized.parse().ok()?;

    if !value.is_finite() || is_sentinel(value) {
        return None;
    }

    Some(value)
}

fn is_sentinel(value: f64) -> bool {
    (value - SENTINEL_VALUE).abs() < SENTINEL_TOLERANCE
}
