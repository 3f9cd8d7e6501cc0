//! Narrative insight cards built from an aggregated result.

use crate::aggregation::{AggregatedRow, Period};
use crate::checks::Checks;
use crate::query_spec::QuerySpec;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Trend,
    Momentum,
    Top,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub headline: String,
    pub details: String,
}

/// Summed value of the latest period against the period before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodChange {
    pub latest: Period,
    pub latest_value: f64,
    pub previous: Option<Period>,
    pub previous_value: f64,
    /// Undefined when the previous period summed to zero or is absent.
    pub delta_pct: Option<f64>,
}

/// Per-period sums in period order. Rows must already be sorted.
pub fn period_totals(rows: &[AggregatedRow]) -> Vec<(Period, f64)> {
    rows.iter()
        .map(|r| (r.period(), r.value))
        .coalesce(|(p1, v1), (p2, v2)| {
            if p1 == p2 {
                Ok((p1, v1 + v2))
            } else {
                Err(((p1, v1), (p2, v2)))
            }
        })
        .collect()
}

pub fn latest_change(rows: &[AggregatedRow]) -> Option<PeriodChange> {
    let totals = period_totals(rows);
    let (latest, latest_value) = *totals.last()?;
    let previous = totals.len().checked_sub(2).map(|i| totals[i]);
    let previous_value = previous.map(|(_, v)| v).unwrap_or(0.0);
    let delta_pct = (previous_value != 0.0)
        .then(|| (latest_value - previous_value) / previous_value * 100.0);

    Some(PeriodChange {
        latest,
        latest_value,
        previous: previous.map(|(p, _)| p),
        previous_value,
        delta_pct,
    })
}

/// Trend, momentum and (with a dimension) top-contributor cards, in that
/// order. No cards for an empty result.
pub fn build_insights(rows: &[AggregatedRow], spec: &QuerySpec, _checks: &Checks) -> Vec<Insight> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut cards = vec![trend_card(rows)];
    if let Some(card) = momentum_card(rows, spec) {
        cards.push(card);
    }
    if let Some(card) = top_contributor_card(rows, spec) {
        cards.push(card);
    }
    cards
}

fn trend_card(rows: &[AggregatedRow]) -> Insight {
    let values: Vec<f64> = rows.iter().map(|r| r.value).filter(|v| v.is_finite()).collect();
    let first = values.first().copied().unwrap_or(0.0);
    let last = values.last().copied().unwrap_or(0.0);
    let pct = if first != 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    let headline = if pct >= 0.0 {
        format!("Up {:.1}% over period", pct)
    } else {
        format!("Down {:.1}% over period", pct.abs())
    };
    Insight {
        kind: InsightKind::Trend,
        headline,
        details: format!("From {} to {}", format_amount(first), format_amount(last)),
    }
}

fn momentum_card(rows: &[AggregatedRow], spec: &QuerySpec) -> Option<Insight> {
    let change = latest_change(rows)?;
    let headline = match change.delta_pct {
        Some(delta) => format!("{:.1}% vs prior {}", delta, spec.grain),
        None => format!("n/a vs prior {}", spec.grain),
    };
    let previous_label = change
        .previous
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string());
    Some(Insight {
        kind: InsightKind::Momentum,
        headline,
        details: format!(
            "{} ({}) vs {} ({})",
            format_amount(change.latest_value),
            change.latest,
            format_amount(change.previous_value),
            previous_label
        ),
    })
}

fn top_contributor_card(rows: &[AggregatedRow], spec: &QuerySpec) -> Option<Insight> {
    let dim = spec.primary_dimension()?;

    let mut by_value: Vec<(&str, f64)> = Vec::new();
    for row in rows {
        let key = match row.dimension(dim) {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        match by_value.iter_mut().find(|(k, _)| *k == key) {
            Some((_, sum)) => *sum += row.value,
            None => by_value.push((key, row.value)),
        }
    }

    let total: f64 = by_value.iter().map(|(_, v)| v).sum();
    let (name, value) = by_value
        .iter()
        .copied()
        .fold(None, |best: Option<(&str, f64)>, (k, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((k, v)),
        })?;
    let share = if total != 0.0 { value / total * 100.0 } else { 0.0 };

    Some(Insight {
        kind: InsightKind::Top,
        headline: format!("{} leads ({:.1}%)", name, share),
        details: format!("{} of {}", format_amount(value), format_amount(total)),
    })
}

/// Thousands-grouped amount with at most two decimals.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let cents = (value.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    match frac {
        0 => format!("{}{}", sign, grouped),
        f if f % 10 == 0 => format!("{}{}.{}", sign, grouped, f / 10),
        f => format!("{}{}.{:02}", sign, grouped, f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::compute_checks;
    use crate::query_spec::{Dimension, Grain, Metric};
    use std::collections::BTreeMap;

    fn row(year: i32, quarter: u32, region: &str, value: f64) -> AggregatedRow {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("region".to_string(), region.to_string());
        AggregatedRow {
            year,
            quarter: Some(quarter),
            month: None,
            dimensions,
            value,
        }
    }

    fn spec() -> QuerySpec {
        QuerySpec::new(Metric::Revenue, Grain::Quarter).with_dimensions(vec![Dimension::Region])
    }

    #[test]
    fn test_cards_in_order() {
        let rows = vec![
            row(2024, 1, "Japan", 100.0),
            row(2024, 1, "Europe", 50.0),
            row(2024, 2, "Japan", 120.0),
            row(2024, 2, "Europe", 60.0),
        ];
        let cards = build_insights(&rows, &spec(), &compute_checks(&rows));
        let kinds: Vec<InsightKind> = cards.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![InsightKind::Trend, InsightKind::Momentum, InsightKind::Top]);

        assert_eq!(cards[0].headline, "Down 40.0% over period");
        assert_eq!(cards[1].headline, "20.0% vs prior quarter");
        assert_eq!(cards[1].details, "180 (2024-Q2) vs 150 (2024-Q1)");
        assert_eq!(cards[2].headline, "Japan leads (66.7%)");
        assert_eq!(cards[2].details, "220 of 330");
    }

    #[test]
    fn test_no_dimension_no_top_card() {
        let rows = vec![row(2024, 1, "Japan", 0.0), row(2024, 2, "Japan", 10.0)];
        let spec = QuerySpec::new(Metric::Units, Grain::Quarter);
        let cards = build_insights(&rows, &spec, &compute_checks(&rows));
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].headline, "Up 0.0% over period");
        assert_eq!(cards[1].headline, "n/a vs prior quarter");
    }

    #[test]
    fn test_empty_rows_yield_no_cards() {
        let checks = compute_checks(&[]);
        assert!(build_insights(&[], &spec(), &checks).is_empty());
    }

    #[test]
    fn test_latest_change_uses_distinct_periods() {
        let rows = vec![
            row(2023, 4, "Japan", 10.0),
            row(2024, 1, "Japan", 5.0),
            row(2024, 1, "Europe", 10.0),
        ];
        let change = latest_change(&rows).unwrap();
        assert_eq!(change.latest_value, 15.0);
        assert_eq!(change.previous_value, 10.0);
        assert_eq!(change.delta_pct, Some(50.0));

        let single = latest_change(&rows[..1]).unwrap();
        assert_eq!(single.previous, None);
        assert_eq!(single.delta_pct, None);
        assert!(latest_change(&[]).is_none());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(1234567.0), "1,234,567");
        assert_eq!(format_amount(999.5), "999.5");
        assert_eq!(format_amount(-1000.25), "-1,000.25");
        assert_eq!(format_amount(0.756), "0.76");
    }
}
