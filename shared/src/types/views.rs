//! Hourly view-delta report types and computation
//!
//! The store computes this report natively; [`hourly_deltas`] is the same
//! computation over in-memory samples and is what the in-memory store and the
//! tests use.

use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::records::PhraseViewSample;

/// Increase of the hourly maximum view count relative to the previous
/// observed hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyDelta {
    /// Hour of day, 0..=23.
    pub hour: u8,
    /// Always positive.
    pub diff: i64,
}

/// Per-phrase report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseViewDeltas {
    pub phrase: String,
    /// Sorted by hour, descending.
    pub deltas: Vec<HourlyDelta>,
}

/// Turn hour-ordered `(hour, max_views)` pairs into positive deltas, latest
/// hour first.
///
/// The first hour has no predecessor and never produces a delta. Flat or
/// decreasing hours are dropped rather than reported as zero or negative.
pub fn deltas_from_maxima(maxima: &[(u8, i64)]) -> Vec<HourlyDelta> {
    let mut deltas: Vec<HourlyDelta> = maxima
        .windows(2)
        .filter_map(|pair| {
            let (_, prev) = pair[0];
            let (hour, current) = pair[1];
            let diff = current.checked_sub(prev)?;
            (diff > 0).then_some(HourlyDelta { hour, diff })
        })
        .collect();
    deltas.reverse();
    deltas
}

/// Compute the hourly view-delta report for one campaign and calendar day.
///
/// Samples from other campaigns or other days are ignored. Hours are taken in
/// UTC. Phrases appear in lexical order, including phrases whose report is
/// empty.
pub fn hourly_deltas(
    samples: &[PhraseViewSample],
    campaign_id: i64,
    day: NaiveDate,
) -> Vec<PhraseViewDeltas> {
    let mut maxima: BTreeMap<&str, BTreeMap<u8, i64>> = BTreeMap::new();

    for sample in samples {
        if sample.campaign_id != campaign_id || sample.dt.date_naive() != day {
            continue;
        }
        let hour = sample.dt.hour() as u8;
        let slot = maxima
            .entry(sample.phrase.as_str())
            .or_default()
            .entry(hour)
            .or_insert(sample.views);
        if sample.views > *slot {
            *slot = sample.views;
        }
    }

    maxima
        .into_iter()
        .map(|(phrase, hours)| {
            let ordered: Vec<(u8, i64)> = hours.into_iter().collect();
            PhraseViewDeltas {
                phrase: phrase.to_string(),
                deltas: deltas_from_maxima(&ordered),
            }
        })
        .collect()
}
