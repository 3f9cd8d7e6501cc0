//! Fact rows as fetched from the sales table, and their geo-derived form.

use crate::query_spec::Dimension;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One raw fact record. `state` is a mixed-format location token
/// (US state code, `CC-City`, bare country code, or free text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub order_date: NaiveDate,
    pub year: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quarter: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub month: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub channel: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cogs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_rep: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DataRow {
    /// Minimal row for a given period; remaining fields are empty.
    pub fn new(order_date: NaiveDate, year: i32, quarter: u32, month: u32) -> Self {
        Self {
            order_date,
            year,
            quarter,
            month,
            region: String::new(),
            state: String::new(),
            channel: String::new(),
            product_category: String::new(),
            product_name: String::new(),
            revenue: 0.0,
            units: 0.0,
            cogs: 0.0,
            sales_rep: None,
        }
    }
}

/// A raw row plus the two fields derived from its location token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRow {
    #[serde(flatten)]
    pub raw: DataRow,
    pub country: String,
    pub market: String,
}

/// A row field as seen by filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Missing,
}

impl FieldValue<'_> {
    /// Strict equality against a JSON scalar: text only equals strings,
    /// numbers only equal numbers.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (FieldValue::Text(s), Value::String(o)) => *s == o.as_str(),
            (FieldValue::Number(n), Value::Number(o)) => o.as_f64() == Some(*n),
            _ => false,
        }
    }

    /// Numeric coercion. Unparseable text and missing fields yield `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Missing => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Missing => String::new(),
        }
    }
}

impl DerivedRow {
    pub fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "year" => FieldValue::Number(self.raw.year as f64),
            "quarter" => FieldValue::Number(self.raw.quarter as f64),
            "month" => FieldValue::Number(self.raw.month as f64),
            "region" => FieldValue::Text(&self.raw.region),
            "state" => FieldValue::Text(&self.raw.state),
            "channel" => FieldValue::Text(&self.raw.channel),
            "product_category" => FieldValue::Text(&self.raw.product_category),
            "product_name" => FieldValue::Text(&self.raw.product_name),
            "sales_rep" => match &self.raw.sales_rep {
                Some(rep) => FieldValue::Text(rep),
                None => FieldValue::Missing,
            },
            "country" => FieldValue::Text(&self.country),
            "market" => FieldValue::Text(&self.market),
            "revenue" => FieldValue::Number(self.raw.revenue),
            "units" => FieldValue::Number(self.raw.units),
            "cogs" => FieldValue::Number(self.raw.cogs),
            _ => FieldValue::Missing,
        }
    }

    pub fn dimension(&self, dim: Dimension) -> String {
        self.field(dim.as_str()).as_text()
    }
}
