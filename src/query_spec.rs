//! QuerySpec - the structured analytical intent behind a question.
//!
//! `RawQuerySpec` is what an oracle hands back: every field is an untyped
//! JSON value and nothing about it is trusted. `QuerySpec` is the typed,
//! enum-valid form the rest of the pipeline consumes.

use crate::error::{DashError, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    Units,
    GrossMarginPct,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Revenue, Metric::Units, Metric::GrossMarginPct];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::Units => "units",
            Metric::GrossMarginPct => "gross_margin_pct",
        }
    }
}

impl FromStr for Metric {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DashError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    Month,
    Quarter,
    Year,
}

impl Grain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grain::Month => "month",
            Grain::Quarter => "quarter",
            Grain::Year => "year",
        }
    }
}

impl FromStr for Grain {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "month" => Ok(Grain::Month),
            "quarter" => Ok(Grain::Quarter),
            "year" => Ok(Grain::Year),
            other => Err(DashError::InvalidSpec(format!("unknown grain '{}'", other))),
        }
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    Channel,
    ProductCategory,
    SalesRep,
    Country,
    Market,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Region,
        Dimension::Channel,
        Dimension::ProductCategory,
        Dimension::SalesRep,
        Dimension::Country,
        Dimension::Market,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::Channel => "channel",
            Dimension::ProductCategory => "product_category",
            Dimension::SalesRep => "sales_rep",
            Dimension::Country => "country",
            Dimension::Market => "market",
        }
    }
}

impl FromStr for Dimension {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| DashError::InvalidSpec(format!("unknown dimension '{}'", s)))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields a filter clause may name besides the dimensions. `state` is the
/// raw location column; the normalizer retargets it.
pub const TIME_PART_FIELDS: [&str; 3] = ["year", "quarter", "month"];
pub const RAW_LOCATION_FIELD: &str = "state";

pub fn is_filterable_field(field: &str) -> bool {
    field.parse::<Dimension>().is_ok()
        || TIME_PART_FIELDS.contains(&field)
        || field == RAW_LOCATION_FIELD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[default]
    Eq,
    In,
    Gte,
    Lte,
    Between,
}

impl FromStr for FilterOp {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "in" => Ok(FilterOp::In),
            "gte" => Ok(FilterOp::Gte),
            "lte" => Ok(FilterOp::Lte),
            "between" => Ok(FilterOp::Between),
            other => Err(DashError::InvalidSpec(format!("unknown filter op '{}'", other))),
        }
    }
}

/// A filter operand: one scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Value>),
    Scalar(Value),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Scalar(Value::Null)
    }
}

impl FilterValue {
    /// The operand as a list. A null scalar is an empty list.
    pub fn to_list(&self) -> Vec<Value> {
        match self {
            FilterValue::List(values) => values.clone(),
            FilterValue::Scalar(Value::Null) => Vec::new(),
            FilterValue::Scalar(v) => vec![v.clone()],
        }
    }

    /// The operand as a single scalar; a one-element list counts.
    pub fn scalar(&self) -> Option<&Value> {
        match self {
            FilterValue::Scalar(v) => Some(v),
            FilterValue::List(values) if values.len() == 1 => values.first(),
            FilterValue::List(_) => None,
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => FilterValue::List(values),
            other => FilterValue::Scalar(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(default)]
    pub op: FilterOp,
    #[serde(default)]
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Build an `in` clause over string values.
    pub fn in_list<S: AsRef<str>>(field: impl Into<String>, values: &[S]) -> Self {
        Self::new(
            field,
            FilterOp::In,
            FilterValue::List(values.iter().map(|v| Value::from(v.as_ref())).collect()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePreset {
    /// Current calendar year and the one before it.
    #[serde(rename = "last_2_years")]
    LastTwoYears,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<TimePreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl TimeRange {
    pub fn last_two_years() -> Self {
        Self {
            preset: Some(TimePreset::LastTwoYears),
            from: None,
            to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub metric: Metric,
    #[serde(default)]
    pub time_range: TimeRange,
    pub grain: Grain,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl QuerySpec {
    pub fn new(metric: Metric, grain: Grain) -> Self {
        Self {
            metric,
            time_range: TimeRange::default(),
            grain,
            dimensions: Vec::new(),
            filters: Vec::new(),
            assumptions: Vec::new(),
        }
    }

    pub fn with_dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn primary_dimension(&self) -> Option<Dimension> {
        self.dimensions.first().copied()
    }
}

/// Untrusted spec as produced by an oracle. Nothing is assumed about the
/// presence or type of any field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawQuerySpec {
    #[serde(default)]
    pub metric: Option<Value>,
    #[serde(default)]
    pub grain: Option<Value>,
    #[serde(default)]
    pub dimensions: Option<Value>,
    #[serde(default)]
    pub filters: Option<Value>,
    #[serde(default)]
    pub time_range: Option<Value>,
    #[serde(default)]
    pub assumptions: Option<Value>,
}

impl RawQuerySpec {
    /// Parse oracle output. Markdown code fences around the JSON are tolerated.
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned = text
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let value: Value = serde_json::from_str(cleaned)?;
        if !value.is_object() {
            return Err(DashError::InvalidSpec(format!(
                "expected a JSON object, got: {}",
                value
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Strict conversion: any enum violation is an error. A missing or unknown
/// metric is `DashError::UnknownMetric`.
impl TryFrom<RawQuerySpec> for QuerySpec {
    type Error = DashError;

    fn try_from(raw: RawQuerySpec) -> Result<Self> {
        let metric = match &raw.metric {
            Some(Value::String(s)) => s.parse::<Metric>()?,
            Some(other) => return Err(DashError::UnknownMetric(other.to_string())),
            None => return Err(DashError::UnknownMetric("<missing>".to_string())),
        };

        let grain = match &raw.grain {
            Some(Value::String(s)) => s.parse::<Grain>()?,
            None | Some(Value::Null) => Grain::Quarter,
            Some(other) => {
                return Err(DashError::InvalidSpec(format!("grain is not a string: {}", other)))
            }
        };

        let dimensions = parse_dimensions(raw.dimensions.as_ref())?;
        let filters = parse_filters(raw.filters.as_ref())?;
        let time_range = parse_time_range(raw.time_range.as_ref());
        let assumptions = match &raw.assumptions {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Ok(QuerySpec {
            metric,
            time_range,
            grain,
            dimensions,
            filters,
            assumptions,
        })
    }
}

fn parse_dimensions(value: Option<&Value>) -> Result<Vec<Dimension>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(DashError::InvalidSpec(format!("dimensions is not a list: {}", other)))
        }
    };
    let dims = items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) => s.parse::<Dimension>(),
            None => Err(DashError::InvalidSpec(format!("dimension is not a string: {}", item))),
        })
        .collect::<Result<Vec<_>>>()?;
    // Dimensions are a set with order; repeated names collapse to the first.
    Ok(dims.into_iter().unique().collect())
}

fn parse_filters(value: Option<&Value>) -> Result<Vec<Filter>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(DashError::InvalidSpec(format!("filters is not a list: {}", other)))
        }
    };

    items
        .iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| {
                DashError::InvalidSpec(format!("filter is not an object: {}", item))
            })?;
            let field = obj
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| DashError::InvalidSpec(format!("filter has no field: {}", item)))?;
            if !is_filterable_field(field) {
                return Err(DashError::InvalidSpec(format!("unknown filter field '{}'", field)));
            }
            let op = match obj.get("op") {
                None | Some(Value::Null) => FilterOp::default(),
                Some(Value::String(s)) => s.parse::<FilterOp>()?,
                Some(other) => {
                    return Err(DashError::InvalidSpec(format!(
                        "filter op is not a string: {}",
                        other
                    )))
                }
            };
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            Ok(Filter::new(field, op, value))
        })
        .collect()
}

/// Time ranges are parsed leniently: an unreadable bound is dropped rather
/// than rejecting the whole QuerySpec.
fn parse_time_range(value: Option<&Value>) -> TimeRange {
    let obj = match value.and_then(Value::as_object) {
        Some(obj) => obj,
        None => return TimeRange::default(),
    };
    let date = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
    };
    TimeRange {
        preset: match obj.get("preset").and_then(Value::as_str) {
            Some("last_2_years") => Some(TimePreset::LastTwoYears),
            _ => None,
        },
        from: date("from"),
        to: date("to"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawQuerySpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_strict_conversion_accepts_valid_spec() {
        let spec = QuerySpec::try_from(raw(json!({
            "metric": "gross_margin_pct",
            "grain": "month",
            "dimensions": ["region", "channel", "region"],
            "filters": [
                {"field": "year", "op": "gte", "value": 2024},
                {"field": "channel", "value": "Online"}
            ],
            "time_range": {"preset": "last_2_years"}
        })))
        .unwrap();

        assert_eq!(spec.metric, Metric::GrossMarginPct);
        assert_eq!(spec.grain, Grain::Month);
        assert_eq!(spec.dimensions, vec![Dimension::Region, Dimension::Channel]);
        assert_eq!(spec.filters[1].op, FilterOp::Eq);
        assert_eq!(spec.time_range.preset, Some(TimePreset::LastTwoYears));
    }

    #[test]
    fn test_unknown_metric_is_named_in_error() {
        let err =
            QuerySpec::try_from(raw(json!({"metric": "profit", "grain": "year"}))).unwrap_err();
        match err {
            DashError::UnknownMetric(name) => assert_eq!(name, "profit"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_grain_defaults_to_quarter() {
        let spec = QuerySpec::try_from(raw(json!({"metric": "units"}))).unwrap();
        assert_eq!(spec.grain, Grain::Quarter);
        assert!(spec.dimensions.is_empty());
        assert_eq!(spec.time_range, TimeRange::default());
    }

    #[test]
    fn test_bad_enums_are_rejected() {
        assert!(QuerySpec::try_from(raw(json!({"metric": "revenue", "grain": "week"}))).is_err());
        let unknown_dimension = json!({"metric": "revenue", "dimensions": ["planet"]});
        assert!(QuerySpec::try_from(raw(unknown_dimension)).is_err());
        assert!(QuerySpec::try_from(raw(json!({
            "metric": "revenue",
            "filters": [{"field": "region", "op": "like", "value": "x"}]
        })))
        .is_err());
        assert!(QuerySpec::try_from(raw(json!({
            "metric": "revenue",
            "filters": [{"field": "product_name", "op": "eq", "value": "x"}]
        })))
        .is_err());
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let parsed = RawQuerySpec::parse("```json\n{\"metric\": \"units\"}\n```").unwrap();
        assert_eq!(parsed.metric, Some(json!("units")));
        assert!(RawQuerySpec::parse("[1, 2]").is_err());
        assert!(RawQuerySpec::parse("not json").is_err());
    }

    #[test]
    fn test_time_range_drops_unreadable_bounds() {
        let spec = QuerySpec::try_from(raw(json!({
            "metric": "revenue",
            "time_range": {"from": "2024-03-01T00:00:00Z", "to": "soon"}
        })))
        .unwrap();
        assert_eq!(spec.time_range.from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(spec.time_range.to, None);
    }

    #[test]
    fn test_filter_value_views() {
        assert_eq!(FilterValue::from(json!(["a", "b"])).to_list().len(), 2);
        assert_eq!(FilterValue::from(json!("a")).to_list(), vec![json!("a")]);
        assert!(FilterValue::Scalar(Value::Null).to_list().is_empty());
        assert_eq!(FilterValue::from(json!([5])).scalar(), Some(&json!(5)));
        assert_eq!(FilterValue::from(json!([1, 2])).scalar(), None);
    }
}
