//! Utility functions and helpers

pub mod retry;
pub mod time;

use tracing::warn;

/// Clamp `value` into `min..=max`, logging when the requested value was out
/// of range.
pub fn clamp_logged(name: &str, value: usize, min: usize, max: usize) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} = {} is out of range {}..={}, using {}", name, value, min, max, clamped);
    }
    clamped
}
