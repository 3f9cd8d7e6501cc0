//! Dashboard pipeline - one question in, one result bundle out.
//!
//! question -> oracle -> validate -> normalize -> fetch -> derive
//!          -> time window -> aggregate -> checks -> insights -> summaries
//!
//! Every request is independent; the pipeline holds configuration and
//! collaborators only.

use crate::aggregation::{AggregatedRow, AggregationEngine};
use crate::checks::{compute_checks, Checks};
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::filter_normalizer;
use crate::geo;
use crate::insights::{build_insights, Insight};
use crate::llm::{self, SpecOracle};
use crate::query_spec::QuerySpec;
use crate::row_source::{fetch_all, FetchLimits, RowSource};
use crate::summary::{
    build_kpis, build_profile, choose_charts, recommend_charts, ChartOption, ChartProfile,
    ChartSpec, Kpi,
};
use crate::time::TimeWindow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source: String,
    pub table: String,
    pub snapshot_at: DateTime<Utc>,
    pub fetched_from: NaiveDate,
    pub rows_fetched: usize,
    pub rows_in_window: usize,
    pub truncated: bool,
}

/// Everything a caller needs to render one answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBundle {
    pub request_id: Uuid,
    pub question: Option<String>,
    pub spec: QuerySpec,
    pub rows: Vec<AggregatedRow>,
    pub checks: Checks,
    pub insights: Vec<Insight>,
    pub kpis: Vec<Kpi>,
    pub profile: ChartProfile,
    pub charts: Vec<ChartSpec>,
    pub recommendations: Vec<ChartOption>,
    pub provenance: Provenance,
}

pub struct DashboardPipeline {
    oracle: Option<Arc<dyn SpecOracle>>,
    source: Arc<dyn RowSource>,
    engine: AggregationEngine,
    oracle_timeout: Duration,
    limits: FetchLimits,
    fetch_floor: NaiveDate,
    today: Option<NaiveDate>,
}

impl DashboardPipeline {
    pub fn new(source: Arc<dyn RowSource>, config: &DashboardConfig) -> Self {
        Self {
            oracle: None,
            source,
            engine: AggregationEngine::new(config.margin_policy),
            oracle_timeout: config.llm_timeout(),
            limits: config.fetch_limits(),
            fetch_floor: config.fetch_from,
            today: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn SpecOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Pin the date that presets resolve against. Defaults to the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Resolve a question into a validated spec. Never fails.
    pub async fn interpret(&self, question: &str) -> QuerySpec {
        llm::interpret(self.oracle.as_deref(), question, self.oracle_timeout).await
    }

    /// Answer a free-text question.
    pub async fn ask(&self, question: &str) -> Result<ResultBundle> {
        let spec = self.interpret(question).await;
        let mut bundle = self.run(spec).await?;
        bundle.question = Some(question.to_string());
        Ok(bundle)
    }

    /// Execute an already-validated spec.
    pub async fn run(&self, mut spec: QuerySpec) -> Result<ResultBundle> {
        let request_id = Uuid::new_v4();
        spec.filters = filter_normalizer::normalize(&spec.filters);

        let today = self.today.unwrap_or_else(|| chrono::Local::now().date_naive());
        let window = TimeWindow::resolve(&spec.time_range, today);
        let fetched_from = window.fetch_from(self.fetch_floor);

        let outcome = fetch_all(self.source.as_ref(), fetched_from, self.limits).await?;
        let rows_fetched = outcome.rows.len();
        let derived: Vec<_> = geo::derive_rows(outcome.rows)
            .into_iter()
            .filter(|r| window.contains(&r.raw))
            .collect();

        let rows = self.engine.aggregate(&derived, &spec);
        let checks = compute_checks(&rows);
        let insights = build_insights(&rows, &spec, &checks);
        let kpis = build_kpis(&rows, &spec);
        let profile = build_profile(&rows, &spec);
        let charts = choose_charts(&spec);
        let recommendations = recommend_charts(&profile);

        info!(
            request_id = %request_id,
            metric = %spec.metric,
            grain = %spec.grain,
            margin_policy = ?self.engine.margin_policy(),
            groups = rows.len(),
            confidence = checks.confidence,
            "Built result bundle"
        );

        Ok(ResultBundle {
            request_id,
            question: None,
            provenance: Provenance {
                source: self.source.name().to_string(),
                table: self.source.table().to_string(),
                snapshot_at: Utc::now(),
                fetched_from,
                rows_fetched,
                rows_in_window: derived.len(),
                truncated: outcome.truncated,
            },
            spec,
            rows,
            checks,
            insights,
            kpis,
            profile,
            charts,
            recommendations,
        })
    }
}
