//! Dashboard configuration, read from the environment (`.env` honoured by
//! the binary).

use crate::aggregation::MarginPolicy;
use crate::error::{DashError, Result};
use crate::row_source::FetchLimits;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Oracle is disabled without a key; every question then takes the
    /// rule-based path.
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub supabase_key: Option<String>,
    #[serde(default = "default_sales_table")]
    pub sales_table: String,
    #[serde(default = "default_page_size")]
    pub fetch_page_size: usize,
    #[serde(default = "default_max_pages")]
    pub fetch_max_pages: usize,
    #[serde(default = "default_fetch_from")]
    pub fetch_from: NaiveDate,
    #[serde(default)]
    pub margin_policy: MarginPolicy,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout_ms() -> u64 {
    15000
}

fn default_sales_table() -> String {
    "sales_fact_rows".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_max_pages() -> usize {
    500
}

fn default_fetch_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            llm_model: default_llm_model(),
            llm_base_url: default_llm_base_url(),
            llm_timeout_ms: default_llm_timeout_ms(),
            supabase_url: None,
            supabase_key: None,
            sales_table: default_sales_table(),
            fetch_page_size: default_page_size(),
            fetch_max_pages: default_max_pages(),
            fetch_from: default_fetch_from(),
            margin_policy: MarginPolicy::default(),
        }
    }
}

impl DashboardConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from a variable map; unset variables keep their defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.openai_api_key = get("OPENAI_API_KEY");
        if let Some(model) = get("LLM_MODEL") {
            config.llm_model = model;
        }
        if let Some(url) = get("LLM_BASE_URL") {
            config.llm_base_url = url;
        }
        if let Some(ms) = get("LLM_TIMEOUT_MS") {
            config.llm_timeout_ms = parse_var("LLM_TIMEOUT_MS", &ms)?;
        }
        config.supabase_url = get("SUPABASE_URL");
        config.supabase_key = get("SUPABASE_KEY");
        if let Some(table) = get("SALES_TABLE") {
            config.sales_table = table;
        }
        if let Some(size) = get("FETCH_PAGE_SIZE") {
            config.fetch_page_size = parse_var("FETCH_PAGE_SIZE", &size)?;
        }
        if let Some(pages) = get("FETCH_MAX_PAGES") {
            config.fetch_max_pages = parse_var("FETCH_MAX_PAGES", &pages)?;
        }
        if let Some(from) = get("FETCH_FROM") {
            config.fetch_from = NaiveDate::parse_from_str(&from, "%Y-%m-%d")
                .map_err(|e| DashError::Config(format!("FETCH_FROM '{}': {}", from, e)))?;
        }
        if let Some(policy) = get("MARGIN_POLICY") {
            config.margin_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_page_size == 0 {
            return Err(DashError::Config("FETCH_PAGE_SIZE must be positive".to_string()));
        }
        if self.fetch_max_pages == 0 {
            return Err(DashError::Config("FETCH_MAX_PAGES must be positive".to_string()));
        }
        if self.llm_timeout_ms == 0 {
            return Err(DashError::Config("LLM_TIMEOUT_MS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            page_size: self.fetch_page_size,
            max_pages: self.fetch_max_pages,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| DashError::Config(format!("{} '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.llm_timeout(), Duration::from_secs(15));
        assert_eq!(config.fetch_limits(), FetchLimits::default());
        assert_eq!(config.margin_policy, MarginPolicy::RatioOfSums);
    }

    #[test]
    fn test_overrides() {
        let config = DashboardConfig::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_MS", "2500"),
            ("FETCH_PAGE_SIZE", "200"),
            ("FETCH_FROM", "2023-06-01"),
            ("MARGIN_POLICY", "per_row_ratio"),
            ("SALES_TABLE", " "),
        ]))
        .unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm_timeout_ms, 2500);
        assert_eq!(config.fetch_page_size, 200);
        assert_eq!(config.fetch_from, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        assert_eq!(config.margin_policy, MarginPolicy::PerRowRatio);
        assert_eq!(config.sales_table, "sales_fact_rows");
    }

    #[test]
    fn test_invalid_values() {
        assert!(DashboardConfig::from_vars(vars(&[("LLM_TIMEOUT_MS", "soon")])).is_err());
        assert!(DashboardConfig::from_vars(vars(&[("FETCH_MAX_PAGES", "0")])).is_err());
        assert!(DashboardConfig::from_vars(vars(&[("FETCH_FROM", "01/02/2024")])).is_err());
        assert!(DashboardConfig::from_vars(vars(&[("MARGIN_POLICY", "average")])).is_err());
    }
}
