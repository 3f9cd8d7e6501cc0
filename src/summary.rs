//! KPI strip, chart profile and chart selection for an aggregated result.

use crate::aggregation::AggregatedRow;
use crate::insights::{latest_change, period_totals};
use crate::query_spec::QuerySpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub label: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_pct: Option<f64>,
}

/// Grand total, then the latest period against the one before it.
pub fn build_kpis(rows: &[AggregatedRow], spec: &QuerySpec) -> Vec<Kpi> {
    let total: f64 = rows.iter().map(|r| r.value).sum();
    let change = latest_change(rows);

    vec![
        Kpi {
            label: spec.metric.as_str().to_uppercase(),
            value: total,
            delta_pct: None,
        },
        Kpi {
            label: format!("{} Latest", spec.grain.as_str().to_uppercase()),
            value: change.as_ref().map(|c| c.latest_value).unwrap_or(0.0),
            delta_pct: change.and_then(|c| c.delta_pct),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartProfile {
    pub has_time: bool,
    pub time_grain: String,
    pub periods: usize,
    pub categories: usize,
    pub series: usize,
    pub has_multiple_series: bool,
}

pub fn build_profile(rows: &[AggregatedRow], spec: &QuerySpec) -> ChartProfile {
    let periods = period_totals(rows).len();
    let categories = match spec.primary_dimension() {
        Some(dim) => rows
            .iter()
            .filter_map(|r| r.dimension(dim))
            .collect::<HashSet<_>>()
            .len(),
        None => 0,
    };

    ChartProfile {
        has_time: true,
        time_grain: spec.grain.as_str().to_string(),
        periods,
        categories,
        series: categories.max(1),
        has_multiple_series: spec.primary_dimension().is_some(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
    Bar,
    StackedBar,
    StackedArea,
    Pie,
}

/// Chart configuration handed to a renderer. Data travels separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    pub title: String,
}

/// Primary time-series line, plus a stacked-bar alternate when split by a
/// dimension.
pub fn choose_charts(spec: &QuerySpec) -> Vec<ChartSpec> {
    let x = spec.grain.as_str().to_string();
    let series = spec.primary_dimension().map(|d| d.as_str().to_string());
    let title = format!(
        "{} by {} ({})",
        spec.metric,
        series.as_deref().unwrap_or(&x),
        spec.grain
    );

    let primary = ChartSpec {
        kind: ChartKind::Line,
        x,
        y: "value".to_string(),
        series,
        title,
    };

    let mut charts = vec![primary.clone()];
    if primary.series.is_some() {
        charts.push(ChartSpec {
            kind: ChartKind::StackedBar,
            ..primary
        });
    }
    charts
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOption {
    pub key: ChartKind,
    pub title: String,
    pub reason: String,
}

const MAX_RECOMMENDATIONS: usize = 3;

/// Offline chart recommendations from the profile alone.
pub fn recommend_charts(profile: &ChartProfile) -> Vec<ChartOption> {
    let option = |key, title: &str, reason: &str| ChartOption {
        key,
        title: title.to_string(),
        reason: reason.to_string(),
    };

    let mut options = Vec::new();
    if profile.has_time && profile.has_multiple_series {
        options.push(option(ChartKind::Line, "Multi-series line", "Compare series over time"));
        options.push(option(ChartKind::StackedArea, "Stacked area", "Show composition over time"));
    } else if profile.has_time {
        options.push(option(ChartKind::Line, "Line", "Trend over time"));
    }
    if (1..=6).contains(&profile.categories) {
        options.push(option(ChartKind::Pie, "Pie", "Small part-to-whole comparison"));
    }
    if options.is_empty() {
        options.push(option(ChartKind::Bar, "Bar", "Category comparison"));
    }
    options.truncate(MAX_RECOMMENDATIONS);
    options
}
