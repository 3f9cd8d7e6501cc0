//! Filter Normalizer - repairs geographic field confusion in filter clauses.
//!
//! Oracles often put a geographic token on the wrong field (region="US"
//! rather than country="US"). Each clause is retargeted onto the field its
//! values actually belong to. One clause in, one clause out.

use crate::query_spec::{Filter, FilterOp, FilterValue};
use crate::taxonomy;
use serde_json::Value;
use tracing::debug;

/// Normalize a filter list. Every output value is a list.
pub fn normalize(filters: &[Filter]) -> Vec<Filter> {
    filters.iter().map(normalize_clause).collect()
}

fn normalize_clause(filter: &Filter) -> Filter {
    let values = filter.value.to_list();

    let normalized = match filter.field.as_str() {
        "region" => normalize_region(values),
        "country" => normalize_country(filter.op, values),
        "state" | "market" => normalize_market(filter.op, values),
        _ => Filter::new(filter.field.clone(), filter.op, FilterValue::List(values)),
    };

    if normalized.field != filter.field {
        debug!(
            "Retargeted filter {} -> {} ({:?})",
            filter.field, normalized.field, normalized.value
        );
    }
    normalized
}

fn normalize_region(values: Vec<Value>) -> Filter {
    let expanded = expand_aliases(&values);

    if expanded.iter().any(|v| text(v).is_some_and(taxonomy::is_country_code)) {
        return in_clause("country", uppercase_codes(expanded, taxonomy::is_country_code));
    }
    if expanded.iter().any(|v| text(v).is_some_and(taxonomy::is_us_state)) {
        return in_clause("market", uppercase_codes(expanded, taxonomy::is_us_state));
    }
    in_clause("region", expanded)
}

fn normalize_country(op: FilterOp, values: Vec<Value>) -> Filter {
    let expanded = expand_aliases(&values);

    if expanded.iter().any(|v| text(v).is_some_and(taxonomy::is_region_name)) {
        return in_clause("region", expanded);
    }
    Filter::new("country", op, FilterValue::List(values))
}

fn normalize_market(op: FilterOp, values: Vec<Value>) -> Filter {
    if values.iter().any(|v| text(v).is_some_and(taxonomy::is_country_code)) {
        return in_clause("country", uppercase_codes(values, taxonomy::is_country_code));
    }
    Filter::new("market", op, FilterValue::List(values))
}

fn in_clause(field: &str, values: Vec<Value>) -> Filter {
    Filter::new(field, FilterOp::In, FilterValue::List(values))
}

fn text(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Expand every string value through the region alias table. Non-string
/// values pass through untouched.
fn expand_aliases(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .flat_map(|v| match v.as_str() {
            Some(s) => taxonomy::expand_region_alias(s)
                .into_iter()
                .map(Value::from)
                .collect::<Vec<_>>(),
            None => vec![v.clone()],
        })
        .collect()
}

/// Codes are stored upper-case in the derived fields; fold recognized
/// codes so `us` matches `US`.
fn uppercase_codes(values: Vec<Value>, is_code: fn(&str) -> bool) -> Vec<Value> {
    values
        .into_iter()
        .map(|v| match v.as_str() {
            Some(s) if is_code(s) => Value::from(s.trim().to_uppercase()),
            _ => v,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(field: &str, op: FilterOp, value: Value) -> Filter {
        Filter::new(field, op, value)
    }

    #[test]
    fn test_region_country_code_retargets_to_country() {
        let out = normalize(&[clause("region", FilterOp::Eq, json!("US"))]);
        assert_eq!(out, vec![clause("country", FilterOp::In, json!(["US"]))]);
    }

    #[test]
    fn test_region_alias_expands() {
        let out = normalize(&[clause("region", FilterOp::In, json!(["asia"]))]);
        assert_eq!(
            out,
            vec![clause(
                "region",
                FilterOp::In,
                json!(["Greater China", "Japan", "Rest of Asia Pacific"])
            )]
        );
    }

    #[test]
    fn test_region_state_code_retargets_to_market() {
        let out = normalize(&[clause("region", FilterOp::In, json!(["tx", "CA"]))]);
        assert_eq!(out, vec![clause("market", FilterOp::In, json!(["TX", "CA"]))]);
    }

    #[test]
    fn test_country_with_region_word_retargets_to_region() {
        let out = normalize(&[clause("country", FilterOp::Eq, json!("eu"))]);
        assert_eq!(out, vec![clause("region", FilterOp::In, json!(["Europe"]))]);

        let out = normalize(&[clause("country", FilterOp::In, json!(["Japan", "KR"]))]);
        assert_eq!(out, vec![clause("region", FilterOp::In, json!(["Japan", "KR"]))]);
    }

    #[test]
    fn test_country_code_keeps_operator() {
        let out = normalize(&[clause("country", FilterOp::Eq, json!("CN"))]);
        assert_eq!(out, vec![clause("country", FilterOp::Eq, json!(["CN"]))]);
    }

    #[test]
    fn test_state_and_market_clauses() {
        let out = normalize(&[
            clause("state", FilterOp::Eq, json!("UK")),
            clause("state", FilterOp::Eq, json!("Shanghai")),
            clause("market", FilterOp::In, json!(["NY", "NJ"])),
        ]);
        assert_eq!(
            out,
            vec![
                clause("country", FilterOp::In, json!(["UK"])),
                clause("market", FilterOp::Eq, json!(["Shanghai"])),
                clause("market", FilterOp::In, json!(["NY", "NJ"])),
            ]
        );
    }

    #[test]
    fn test_other_fields_only_coerce_values() {
        let out = normalize(&[
            clause("channel", FilterOp::Eq, json!("Online")),
            clause("year", FilterOp::Between, json!([2023, 2024])),
        ]);
        assert_eq!(
            out,
            vec![
                clause("channel", FilterOp::Eq, json!(["Online"])),
                clause("year", FilterOp::Between, json!([2023, 2024])),
            ]
        );
    }

    #[test]
    fn test_one_clause_per_input_and_idempotent() {
        let input = vec![
            clause("region", FilterOp::Eq, json!("US")),
            clause("region", FilterOp::In, json!(["apac", "Europe"])),
            clause("country", FilterOp::Eq, json!("americas")),
            clause("state", FilterOp::Eq, json!("CN")),
            clause("market", FilterOp::Eq, json!("WA")),
            clause("quarter", FilterOp::Gte, json!(2)),
            clause("region", FilterOp::Eq, json!("Americas")),
        ];
        let once = normalize(&input);
        assert_eq!(once.len(), input.len());
        assert_eq!(normalize(&once), once);
    }
}
