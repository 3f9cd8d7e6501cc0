use crate::error::{DashError, Result};
use crate::query_spec::QuerySpec;
use crate::spec_validator;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Something that turns a question into (untrusted) QuerySpec JSON text.
#[async_trait]
pub trait SpecOracle: Send + Sync {
    async fn propose(&self, question: &str) -> Result<String>;
}

/// JSON schema describing QuerySpec, embedded in the oracle prompt.
pub fn query_spec_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "metric": { "enum": ["revenue", "units", "gross_margin_pct"] },
            "time_range": {
                "type": "object",
                "properties": {
                    "preset": { "enum": ["last_2_years"] },
                    "from": { "type": "string" },
                    "to": { "type": "string" }
                },
                "additionalProperties": false
            },
            "grain": { "enum": ["month", "quarter", "year"] },
            "dimensions": {
                "type": "array",
                "items": {
                    "enum": [
                        "region", "channel", "product_category", "sales_rep", "country", "market"
                    ]
                }
            },
            "filters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": {
                            "enum": [
                                "region", "channel", "product_category", "sales_rep", "country",
                                "market", "year", "quarter", "month"
                            ]
                        },
                        "op": { "enum": ["eq", "in", "gte", "lte", "between"] },
                        "value": {}
                    },
                    "required": ["field", "op", "value"],
                    "additionalProperties": false
                }
            },
            "assumptions": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["metric", "grain", "dimensions", "filters", "time_range"]
    })
}

fn system_prompt() -> String {
    format!(
        r#"You are an intent parser for a sales dashboard. Output ONLY valid JSON that matches the provided JSON Schema.

JSON Schema: {}

Mapping rules:
- "sales", "revenue", "gmv" => metric: revenue
- "units" => metric: units
- "margin" => metric: gross_margin_pct
- If time grain mentioned: year/quarter/month. Default quarter.
- If regions or countries are mentioned, set dimensions:['region'] and add a filter with op:'in'.
- Use time_range.preset:'last_2_years' unless explicit dates provided."#,
        query_spec_schema()
    )
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_llm(&self, question: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": question}
            ],
            "temperature": 0,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DashError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DashError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| DashError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(DashError::Llm(format!("LLM API error: {}", error)));
        }

        let content = response_json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DashError::Llm(format!("No content in LLM response: {}", response_json))
            })?;

        if content.trim().is_empty() {
            return Err(DashError::Llm("Empty content in LLM response".to_string()));
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl SpecOracle for LlmClient {
    async fn propose(&self, question: &str) -> Result<String> {
        self.call_llm(question).await
    }
}

/// Ask the oracle for a spec, bounded by `timeout`. Oracle errors, timeouts
/// and invalid output all resolve to the rule-based fallback.
pub async fn interpret(
    oracle: Option<&dyn SpecOracle>,
    question: &str,
    timeout: Duration,
) -> QuerySpec {
    let oracle = match oracle {
        Some(o) => o,
        None => return spec_validator::validate_response(None, question),
    };

    let response = match tokio::time::timeout(timeout, oracle.propose(question)).await {
        Ok(Ok(text)) => {
            info!("Oracle responded ({} bytes)", text.len());
            Some(text)
        }
        Ok(Err(e)) => {
            warn!("Oracle call failed: {}", e);
            None
        }
        Err(_) => {
            warn!("Oracle timed out after {}ms", timeout.as_millis());
            None
        }
    };
    spec_validator::validate_response(response.as_deref(), question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_spec::{Grain, Metric};
    use crate::spec_validator::is_fallback;

    struct Fixed(&'static str);

    #[async_trait]
    impl SpecOracle for Fixed {
        async fn propose(&self, _question: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl SpecOracle for Failing {
        async fn propose(&self, _question: &str) -> Result<String> {
            Err(DashError::Llm("connection refused".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl SpecOracle for Slow {
        async fn propose(&self, _question: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(r#"{"metric":"revenue","grain":"month"}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_valid_oracle_output_is_used() {
        let oracle = Fixed(r#"{"metric":"units","grain":"month","dimensions":[],"filters":[]}"#);
        let spec = interpret(Some(&oracle), "q", Duration::from_secs(1)).await;
        assert!(!is_fallback(&spec));
        assert_eq!(spec.metric, Metric::Units);
        assert_eq!(spec.grain, Grain::Month);
    }

    #[tokio::test]
    async fn test_failures_fall_back() {
        let q = "units per year";
        for spec in [
            interpret(Some(&Failing), q, Duration::from_secs(1)).await,
            interpret(Some(&Fixed("{\"metric\": \"margin\"}")), q, Duration::from_secs(1)).await,
            interpret(Some(&Fixed("sorry, I can't")), q, Duration::from_secs(1)).await,
            interpret(None, q, Duration::from_secs(1)).await,
        ] {
            assert!(is_fallback(&spec));
            assert_eq!(spec.metric, Metric::Units);
            assert_eq!(spec.grain, Grain::Year);
        }
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let spec = interpret(Some(&Slow), "revenue", Duration::from_millis(20)).await;
        assert!(is_fallback(&spec));
    }

    #[test]
    fn test_schema_lists_every_metric() {
        let schema = query_spec_schema();
        let metrics = schema.pointer("/properties/metric/enum").unwrap().as_array().unwrap();
        for m in Metric::ALL {
            assert!(metrics.contains(&Value::from(m.as_str())));
        }
        assert!(system_prompt().contains("last_2_years"));
    }

    #[test]
    fn test_client_keeps_configured_model() {
        let client = LlmClient::new(
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            "http://localhost:9".to_string(),
        );
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
