//! Business taxonomy: US states, country codes and region aliases.
//!
//! The filter normalizer and the geo deriver both read these tables, so
//! every lookup goes through the functions below.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// Canonical region names as stored in the fact table's `region` column.
pub const REGION_NAMES: [&str; 5] = [
    "Europe",
    "Americas",
    "Greater China",
    "Japan",
    "Rest of Asia Pacific",
];

lazy_static! {
    /// Two-letter US state codes, including DC.
    pub static ref US_STATE_CODES: HashSet<&'static str> = [
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "IA", "ID", "IL",
        "IN", "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND",
        "NE", "NH", "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN",
        "TX", "UT", "VA", "VT", "WA", "WI", "WV", "WY", "DC",
    ]
    .into_iter()
    .collect();

    /// Country codes present in the dataset. Kept disjoint from the state
    /// codes so a token never reads as both.
    pub static ref COUNTRY_CODES: HashSet<&'static str> = [
        "US", "UK", "GB", "CN", "JP", "NL", "FR", "IT", "ES", "IE", "CH", "SE", "AU",
        "KR", "TW", "HK", "SG", "BR", "MX",
    ]
    .into_iter()
    .collect();

    static ref REGION_ALIASES: HashMap<&'static str, Vec<&'static str>> = {
        let mut m = HashMap::new();
        let asia = vec!["Greater China", "Japan", "Rest of Asia Pacific"];
        for alias in ["asia", "apac", "asia pacific"] {
            m.insert(alias, asia.clone());
        }
        for alias in ["europe", "eu"] {
            m.insert(alias, vec!["Europe"]);
        }
        for alias in ["americas", "na", "latam"] {
            m.insert(alias, vec!["Americas"]);
        }
        m
    };
}

/// Expand a free-text region token into canonical region names.
/// Unknown tokens come back unchanged as a single-element list.
pub fn expand_region_alias(token: &str) -> Vec<String> {
    let key = token.trim().to_lowercase();
    match REGION_ALIASES.get(key.as_str()) {
        Some(regions) => regions.iter().map(|r| r.to_string()).collect(),
        None => vec![token.to_string()],
    }
}

pub fn is_country_code(token: &str) -> bool {
    COUNTRY_CODES.contains(token.trim().to_uppercase().as_str())
}

pub fn is_us_state(token: &str) -> bool {
    US_STATE_CODES.contains(token.trim().to_uppercase().as_str())
}

/// Exact, case-sensitive state check used on raw location tokens.
pub fn is_exact_us_state(token: &str) -> bool {
    US_STATE_CODES.contains(token)
}

pub fn is_region_name(token: &str) -> bool {
    REGION_NAMES.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table_has_fifty_one_entries() {
        assert_eq!(US_STATE_CODES.len(), 51);
        assert!(US_STATE_CODES.contains("DC"));
    }

    #[test]
    fn test_country_and_state_codes_disjoint() {
        assert!(COUNTRY_CODES.is_disjoint(&US_STATE_CODES));
    }

    #[test]
    fn test_alias_expansion_is_case_insensitive() {
        assert_eq!(
            expand_region_alias("APAC"),
            vec!["Greater China", "Japan", "Rest of Asia Pacific"]
        );
        assert_eq!(expand_region_alias("Asia Pacific").len(), 3);
        assert_eq!(expand_region_alias("eu"), vec!["Europe"]);
        assert_eq!(expand_region_alias("LatAm"), vec!["Americas"]);
    }

    #[test]
    fn test_unknown_alias_passes_through() {
        assert_eq!(expand_region_alias("Mars"), vec!["Mars"]);
        assert_eq!(expand_region_alias("Japan"), vec!["Japan"]);
    }

    #[test]
    fn test_code_lookups() {
        assert!(is_country_code("us"));
        assert!(is_country_code("CN"));
        assert!(!is_country_code("CA"));
        assert!(is_us_state("ca"));
        assert!(!is_exact_us_state("ca"));
        assert!(is_exact_us_state("CA"));
        assert!(is_region_name("Rest of Asia Pacific"));
        assert!(!is_region_name("asia"));
    }
}
