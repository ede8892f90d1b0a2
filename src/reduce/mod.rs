//! Numeric reduction of one window's samples.

use crate::client::Sample;
use crate::config::AggregationKind;

/// Reduce samples into one optional scalar per requested kind.
///
/// "No data" samples are excluded before reduction; every kind yields `None`
/// over an empty value set. Pure: identical inputs always produce identical
/// results.
pub fn reduce(samples: &[Sample], kinds: &[AggregationKind]) -> Vec<(AggregationKind, Option<f64>)> {
    let values: Vec<f64> = samples.iter().filter_map(|s| s.value).collect();

    kinds
        .iter()
        .map(|kind| (*kind, reduce_one(&values, *kind)))
        .collect()
}

fn reduce_one(values: &[f64], kind: AggregationKind) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let folded = match kind {
        AggregationKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationKind::Avg => values.iter().sum::<f64>() / values.len() as f64,
    };

    Some(folded)
}
