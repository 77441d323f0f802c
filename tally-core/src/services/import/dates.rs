//! Date format detection

use crate::domain::DateFormat;

/// Every format that accepts all non-empty samples, in priority order.
///
/// A sample is accepted when it has the format's shape and is a real
/// calendar date. With no non-empty samples there is no evidence, so
/// nothing is returned.
pub fn detect_candidates<S: AsRef<str>>(samples: &[S]) -> Vec<DateFormat> {
    let values: Vec<&str> = samples
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if values.is_empty() {
        return Vec::new();
    }

    DateFormat::ALL
        .iter()
        .copied()
        .filter(|format| values.iter().all(|v| format.parse(v).is_some()))
        .collect()
}

/// The highest-priority format accepting every sample.
///
/// Priority is ISO first, then US month-first before day-first. Values such
/// as `01/02/2024` fit several formats; callers should check
/// [`detect_candidates`] and let the user override in that case.
pub fn detect_format<S: AsRef<str>>(samples: &[S]) -> Option<DateFormat> {
    detect_candidates(samples).into_iter().next()
}
