//! Aggregation Engine - filters derived rows, groups them by time grain and
//! dimensions, and accumulates the requested metric per group.

use crate::error::{DashError, Result};
use crate::query_spec::{Dimension, Filter, FilterOp, FilterValue, Grain, Metric, QuerySpec};
use crate::rows::{DerivedRow, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How `gross_margin_pct` is accumulated within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginPolicy {
    /// sum(revenue) and sum(cogs) per group, divided once at the end.
    #[default]
    RatioOfSums,
    /// Each row's own (revenue - cogs) / revenue added into the group.
    /// Biased when row sizes differ; kept for parity with older dashboards.
    PerRowRatio,
}

impl FromStr for MarginPolicy {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ratio_of_sums" => Ok(MarginPolicy::RatioOfSums),
            "per_row_ratio" => Ok(MarginPolicy::PerRowRatio),
            other => Err(DashError::Config(format!("unknown margin policy '{}'", other))),
        }
    }
}

/// A time bucket. Ordering is year, then quarter, then month, with a
/// missing part sorting as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Period {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

impl Period {
    fn sort_key(&self) -> (i32, u32, u32) {
        (self.year, self.quarter.unwrap_or(0), self.month.unwrap_or(0))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.quarter, self.month) {
            (Some(q), _) => write!(f, "{}-Q{}", self.year, q),
            (None, Some(m)) => write!(f, "{}-{:02}", self.year, m),
            (None, None) => write!(f, "{}", self.year),
        }
    }
}

/// One output group: its time-grain parts, its dimension values keyed by
/// dimension name, and the accumulated metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(flatten)]
    pub dimensions: BTreeMap<String, String>,
    pub value: f64,
}

impl AggregatedRow {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            quarter: self.quarter,
            month: self.month,
        }
    }

    pub fn dimension(&self, dim: Dimension) -> Option<&str> {
        self.dimensions.get(dim.as_str()).map(String::as_str)
    }
}

struct GroupAcc {
    row: AggregatedRow,
    revenue: f64,
    cogs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    margin_policy: MarginPolicy,
}

impl AggregationEngine {
    pub fn new(margin_policy: MarginPolicy) -> Self {
        Self { margin_policy }
    }

    pub fn margin_policy(&self) -> MarginPolicy {
        self.margin_policy
    }

    /// Filter, group and accumulate. Output is sorted by period ascending;
    /// groups within one period keep first-seen order.
    pub fn aggregate(&self, rows: &[DerivedRow], spec: &QuerySpec) -> Vec<AggregatedRow> {
        let mut groups: Vec<GroupAcc> = Vec::new();
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut passed = 0usize;

        for row in rows.iter().filter(|r| passes_filters(r, &spec.filters)) {
            passed += 1;
            let period = period_for(row, spec.grain);
            let dims: Vec<(Dimension, String)> = spec
                .dimensions
                .iter()
                .map(|d| (*d, row.dimension(*d)))
                .collect();

            let key = group_key(&period, &dims);
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(GroupAcc {
                    row: AggregatedRow {
                        year: period.year,
                        quarter: period.quarter,
                        month: period.month,
                        dimensions: dims
                            .iter()
                            .map(|(d, v)| (d.as_str().to_string(), v.clone()))
                            .collect(),
                        value: 0.0,
                    },
                    revenue: 0.0,
                    cogs: 0.0,
                });
                groups.len() - 1
            });

            let acc = &mut groups[slot];
            acc.revenue += row.raw.revenue;
            acc.cogs += row.raw.cogs;
            acc.row.value += self.contribution(row, spec.metric);
        }

        let mut out: Vec<AggregatedRow> = groups
            .into_iter()
            .map(|acc| self.finish(acc, spec.metric))
            .collect();
        out.sort_by_key(|r| r.period());

        debug!(
            "Aggregated {} of {} rows into {} groups ({} by {:?})",
            passed,
            rows.len(),
            out.len(),
            spec.metric,
            spec.dimensions
        );
        out
    }

    /// The amount one row adds to its group's running value.
    pub fn contribution(&self, row: &DerivedRow, metric: Metric) -> f64 {
        match metric {
            Metric::Revenue => row.raw.revenue,
            Metric::Units => row.raw.units,
            Metric::GrossMarginPct => match self.margin_policy {
                MarginPolicy::PerRowRatio => row_margin(row.raw.revenue, row.raw.cogs),
                MarginPolicy::RatioOfSums => 0.0,
            },
        }
    }

    fn finish(&self, acc: GroupAcc, metric: Metric) -> AggregatedRow {
        let mut row = acc.row;
        if metric == Metric::GrossMarginPct && self.margin_policy == MarginPolicy::RatioOfSums {
            row.value = row_margin(acc.revenue, acc.cogs);
        }
        row
    }
}

/// Aggregate with the default margin policy.
pub fn aggregate(rows: &[DerivedRow], spec: &QuerySpec) -> Vec<AggregatedRow> {
    AggregationEngine::default().aggregate(rows, spec)
}

fn row_margin(revenue: f64, cogs: f64) -> f64 {
    if revenue > 0.0 {
        (revenue - cogs) / revenue
    } else {
        0.0
    }
}

fn period_for(row: &DerivedRow, grain: Grain) -> Period {
    let year = row.raw.year;
    match grain {
        Grain::Year => Period {
            year,
            quarter: None,
            month: None,
        },
        Grain::Quarter => Period {
            year,
            quarter: Some(row.raw.quarter),
            month: None,
        },
        Grain::Month => Period {
            year,
            quarter: None,
            month: Some(row.raw.month),
        },
    }
}

fn group_key(period: &Period, dims: &[(Dimension, String)]) -> Vec<String> {
    let mut key = vec![period.year.to_string()];
    if let Some(q) = period.quarter {
        key.push(q.to_string());
    }
    if let Some(m) = period.month {
        key.push(m.to_string());
    }
    key.extend(dims.iter().map(|(_, v)| v.clone()));
    key
}

/// All clauses ANDed; an empty list passes everything.
pub fn passes_filters(row: &DerivedRow, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches_filter(row, f))
}

pub fn matches_filter(row: &DerivedRow, filter: &Filter) -> bool {
    let field = row.field(&filter.field);
    match filter.op {
        FilterOp::Eq => filter.value.scalar().is_some_and(|v| field.equals(v)),
        FilterOp::In => match &filter.value {
            FilterValue::List(values) => values.iter().any(|v| field.equals(v)),
            FilterValue::Scalar(v) => field.equals(v),
        },
        FilterOp::Gte => compare(&field, filter.value.scalar(), |a, b| a >= b),
        FilterOp::Lte => compare(&field, filter.value.scalar(), |a, b| a <= b),
        FilterOp::Between => match &filter.value {
            FilterValue::List(bounds) if bounds.len() == 2 => {
                compare(&field, Some(&bounds[0]), |a, b| a >= b)
                    && compare(&field, Some(&bounds[1]), |a, b| a <= b)
            }
            // Wrong arity is a permissive pass-through.
            _ => true,
        },
    }
}

fn compare(field: &FieldValue<'_>, operand: Option<&Value>, cmp: fn(f64, f64) -> bool) -> bool {
    match (field.as_number(), operand.and_then(value_as_number)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
