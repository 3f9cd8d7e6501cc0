//! Spec Validator - never lets an invalid spec through.
//!
//! A candidate spec that violates any enum is discarded whole and replaced
//! by a keyword-rule spec derived from the question text. The same fallback
//! covers an oracle that failed outright.

use crate::query_spec::{Dimension, Grain, Metric, QuerySpec, RawQuerySpec, TimeRange};
use tracing::{info, warn};

/// Marker recorded in `assumptions` whenever the rule-based path was used.
pub const FALLBACK_ASSUMPTION: &str = "Parsed with rule-based fallback";

/// Deterministic spec built from keyword rules over the question.
pub fn rule_fallback(question: &str) -> QuerySpec {
    let q = question.to_lowercase();
    let metric = if q.contains("unit") {
        Metric::Units
    } else {
        Metric::Revenue
    };
    let grain = if q.contains("year") {
        Grain::Year
    } else {
        Grain::Quarter
    };
    let dimensions = if q.contains("region") {
        vec![Dimension::Region]
    } else {
        Vec::new()
    };

    QuerySpec {
        metric,
        time_range: TimeRange::last_two_years(),
        grain,
        dimensions,
        filters: Vec::new(),
        assumptions: vec![FALLBACK_ASSUMPTION.to_string()],
    }
}

/// Validate a candidate spec against the closed enums. Never fails.
pub fn validate(raw: RawQuerySpec, question: &str) -> QuerySpec {
    match QuerySpec::try_from(raw) {
        Ok(spec) => spec,
        Err(e) => {
            warn!("Rejected oracle spec ({}), using rule-based fallback", e);
            rule_fallback(question)
        }
    }
}

/// Validate oracle output text, or fall back when the oracle produced
/// nothing usable.
pub fn validate_response(response: Option<&str>, question: &str) -> QuerySpec {
    let text = match response {
        Some(text) => text,
        None => {
            info!("No oracle response, using rule-based fallback");
            return rule_fallback(question);
        }
    };
    match RawQuerySpec::parse(text) {
        Ok(raw) => validate(raw, question),
        Err(e) => {
            warn!("Unparseable oracle response ({}), using rule-based fallback", e);
            rule_fallback(question)
        }
    }
}

pub fn is_fallback(spec: &QuerySpec) -> bool {
    spec.assumptions.iter().any(|a| a == FALLBACK_ASSUMPTION)
}
