//! Grounding checks over an aggregated result: control totals, period
//! continuity, z-score outliers and a composite confidence.

use crate::aggregation::AggregatedRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// |z| at or above this is an outlier.
pub const OUTLIER_Z: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub index: usize,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checks {
    pub control_totals_ok: bool,
    pub continuity_ok: bool,
    pub outliers: Vec<Outlier>,
    pub confidence: f64,
}

pub fn compute_checks(rows: &[AggregatedRow]) -> Checks {
    let control_totals_ok = !rows.is_empty();
    let continuity_ok = continuity_ok(rows);
    let outliers = find_outliers(rows);

    let confidence: f64 = (if control_totals_ok { 0.5 } else { 0.0 })
        + (if continuity_ok { 0.3 } else { 0.0 })
        + (if outliers.is_empty() { 0.2 } else { 0.1 });

    Checks {
        control_totals_ok,
        continuity_ok,
        outliers,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Every year with quarter data must show at least two distinct quarters.
/// Vacuously true without quarter data.
fn continuity_ok(rows: &[AggregatedRow]) -> bool {
    let mut by_year: BTreeMap<i32, BTreeSet<u32>> = BTreeMap::new();
    for row in rows {
        if let Some(q) = row.quarter {
            by_year.entry(row.year).or_default().insert(q);
        }
    }
    by_year.values().all(|quarters| quarters.len() >= 2)
}

fn find_outliers(rows: &[AggregatedRow]) -> Vec<Outlier> {
    let values: Vec<f64> = rows.iter().map(|r| r.value).filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let sd = match variance.sqrt() {
        sd if sd > 0.0 && sd.is_finite() => sd,
        _ => 1.0,
    };

    rows.iter()
        .enumerate()
        .filter_map(|(index, r)| {
            let z = (r.value - mean) / sd;
            (z.abs() >= OUTLIER_Z).then_some(Outlier { index, z })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: i32, quarter: Option<u32>, value: f64) -> AggregatedRow {
        AggregatedRow {
            year,
            quarter,
            month: None,
            dimensions: BTreeMap::new(),
            value,
        }
    }

    #[test]
    fn test_empty_rows_are_neutral() {
        let checks = compute_checks(&[]);
        assert!(!checks.control_totals_ok);
        assert!(checks.continuity_ok);
        assert!(checks.outliers.is_empty());
        assert!((checks.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_continuity_requires_two_quarters_per_year() {
        let ok = compute_checks(&[
            row(2023, Some(1), 1.0),
            row(2023, Some(2), 1.0),
            row(2024, Some(3), 1.0),
            row(2024, Some(3), 2.0),
            row(2024, Some(4), 1.0),
        ]);
        assert!(ok.continuity_ok);

        let gap = compute_checks(&[
            row(2023, Some(1), 1.0),
            row(2023, Some(2), 1.0),
            row(2024, Some(1), 1.0),
        ]);
        assert!(!gap.continuity_ok);

        let yearly = compute_checks(&[row(2023, None, 1.0), row(2024, None, 2.0)]);
        assert!(yearly.continuity_ok);
    }

    #[test]
    fn test_outlier_detection() {
        let mut rows: Vec<AggregatedRow> = (0..9).map(|_| row(2024, None, 10.0)).collect();
        rows.push(row(2024, None, 100.0));
        let checks = compute_checks(&rows);
        assert_eq!(checks.outliers.len(), 1);
        assert_eq!(checks.outliers[0].index, 9);
        assert!(checks.outliers[0].z >= OUTLIER_Z);
        assert!((checks.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_constant_values_have_no_outliers() {
        let checks = compute_checks(&[row(2024, Some(1), 5.0), row(2024, Some(2), 5.0)]);
        assert!(checks.outliers.is_empty());
        assert!((checks.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_bounds() {
        let cases = [
            vec![],
            vec![row(2024, Some(1), 1.0)],
            vec![row(2024, Some(1), -5.0), row(2025, Some(1), 1e12)],
        ];
        for rows in cases {
            let c = compute_checks(&rows).confidence;
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_confidence_sums_components() {
        let gap = compute_checks(&[row(2024, Some(1), 3.0)]);
        assert!(gap.control_totals_ok);
        assert!(!gap.continuity_ok);
        assert!((gap.confidence - 0.7).abs() < 1e-9);
    }
}
