//! Geo derivation: splits the mixed `state` location token into
//! `country` and `market`.
//!
//! - US state code          -> country `US`, market = the code
//! - `CC-City` (CN-Shanghai) -> country `CC`, market = the remainder
//! - bare `CC` (UK, JP)      -> country `CC`, no market
//! - anything else          -> no country, market = the token

use crate::rows::{DataRow, DerivedRow};
use crate::taxonomy;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref CODE_WITH_SUFFIX: Regex = Regex::new(r"^[A-Z]{2}-.+").unwrap();
    static ref BARE_CODE: Regex = Regex::new(r"^[A-Z]{2}$").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoFields {
    pub country: String,
    pub market: String,
}

impl GeoFields {
    fn new(country: &str, market: &str) -> Self {
        Self {
            country: country.to_string(),
            market: market.to_string(),
        }
    }
}

/// Derive country/market from a location token. Total: every input maps to
/// some result.
pub fn derive(token: &str) -> GeoFields {
    let token = token.trim();
    if token.is_empty() {
        return GeoFields::default();
    }
    if taxonomy::is_exact_us_state(token) {
        return GeoFields::new("US", token);
    }
    if CODE_WITH_SUFFIX.is_match(token) {
        if let Some((code, rest)) = token.split_once('-') {
            return GeoFields::new(code, rest);
        }
    }
    if BARE_CODE.is_match(token) {
        return GeoFields::new(token, "");
    }
    GeoFields::new("", token)
}

pub fn derive_row(raw: DataRow) -> DerivedRow {
    let GeoFields { country, market } = derive(&raw.state);
    DerivedRow {
        raw,
        country,
        market,
    }
}

/// Runs over every fetched row before any filtering or grouping.
pub fn derive_rows(rows: Vec<DataRow>) -> Vec<DerivedRow> {
    rows.into_iter().map(derive_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_documented_tokens() {
        assert_eq!(derive(""), GeoFields::new("", ""));
        assert_eq!(derive("CA"), GeoFields::new("US", "CA"));
        assert_eq!(derive("CN-Shanghai"), GeoFields::new("CN", "Shanghai"));
        assert_eq!(derive("UK"), GeoFields::new("UK", ""));
        assert_eq!(derive("Springfield"), GeoFields::new("", "Springfield"));
    }

    #[test]
    fn test_token_is_trimmed() {
        assert_eq!(derive("  NY "), GeoFields::new("US", "NY"));
        assert_eq!(derive("   "), GeoFields::default());
    }

    #[test]
    fn test_market_keeps_everything_after_first_hyphen() {
        assert_eq!(derive("JP-Tokyo-Minato"), GeoFields::new("JP", "Tokyo-Minato"));
    }

    #[test]
    fn test_lowercase_codes_are_free_text() {
        assert_eq!(derive("ca"), GeoFields::new("", "ca"));
        assert_eq!(derive("cn-Beijing"), GeoFields::new("", "cn-Beijing"));
        assert_eq!(derive("USA"), GeoFields::new("", "USA"));
    }

    #[test]
    fn test_derive_row_only_adds_fields() {
        let mut raw = DataRow::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 2024, 2, 5);
        raw.state = "NL".to_string();
        let derived = derive_row(raw.clone());
        assert_eq!(derived.raw, raw);
        assert_eq!(derived.country, "NL");
        assert_eq!(derived.market, "");
    }
}
