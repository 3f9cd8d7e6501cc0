//! Row sources - where fact rows come from.
//!
//! Every source pages rows with `order_date >= from`, ordered by
//! `order_date` ascending. `fetch_all` walks the pages until a short page
//! and stops at a page bound so an oversized table cannot exhaust memory.

use crate::error::{DashError, Result};
use crate::rows::DataRow;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns requested from remote sources.
pub const ROW_COLUMNS: &str =
    "order_date,year,quarter,month,region,state,channel,product_category,product_name,revenue,units,cogs";

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Short name used in provenance.
    fn name(&self) -> &str;

    /// Table or file the rows come from.
    fn table(&self) -> &str;

    async fn fetch_page(
        &self,
        from: NaiveDate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DataRow>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchLimits {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub rows: Vec<DataRow>,
    pub pages: usize,
    /// True when the page bound stopped the fetch before exhaustion.
    pub truncated: bool,
}

pub async fn fetch_all(
    source: &dyn RowSource,
    from: NaiveDate,
    limits: FetchLimits,
) -> Result<FetchOutcome> {
    if limits.page_size == 0 {
        return Err(DashError::Config("page size must be positive".to_string()));
    }

    let mut rows = Vec::new();
    let mut pages = 0;
    let mut truncated = false;

    loop {
        if pages >= limits.max_pages {
            truncated = true;
            warn!(
                "Fetch from {} stopped at {} pages ({} rows)",
                source.table(),
                pages,
                rows.len()
            );
            break;
        }

        let page = source.fetch_page(from, rows.len(), limits.page_size).await?;
        pages += 1;
        let short = page.len() < limits.page_size;
        debug!("Fetched page {} with {} rows", pages, page.len());
        rows.extend(page);
        if short {
            break;
        }
    }

    info!("Fetched {} rows from {} since {}", rows.len(), source.table(), from);
    Ok(FetchOutcome {
        rows,
        pages,
        truncated,
    })
}

/// Rows held in memory. Used for CSV input and tests.
#[derive(Debug, Clone)]
pub struct MemoryRowSource {
    table: String,
    rows: Vec<DataRow>,
}

impl MemoryRowSource {
    pub fn new(table: impl Into<String>, mut rows: Vec<DataRow>) -> Self {
        rows.sort_by_key(|r| r.order_date);
        Self {
            table: table.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_page(
        &self,
        from: NaiveDate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DataRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.order_date >= from)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Read a CSV export of the fact table into memory.
pub fn load_csv(path: &Path) -> Result<MemoryRowSource> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<DataRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(MemoryRowSource::new(path.display().to_string(), rows))
}

/// PostgREST (Supabase) table reader.
#[derive(Clone)]
pub struct RestRowSource {
    base_url: String,
    api_key: String,
    table: String,
    http: reqwest::Client,
}

impl RestRowSource {
    pub fn new(base_url: String, api_key: String, table: String) -> Self {
        Self {
            base_url,
            api_key,
            table,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RowSource for RestRowSource {
    fn name(&self) -> &str {
        "supabase"
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_page(
        &self,
        from: NaiveDate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DataRow>> {
        let url = format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table);
        let order_date_filter = format!("gte.{}", from.format("%Y-%m-%d"));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("select", ROW_COLUMNS),
                ("order_date", order_date_filter.as_str()),
                ("order", "order_date.asc"),
            ])
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{}", offset, offset + limit.max(1) - 1))
            .send()
            .await
            .map_err(|e| DashError::Source(format!("Row fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DashError::Source(format!("Row source error ({}): {}", status, error_text)));
        }

        Ok(response.json::<Vec<DataRow>>().await?)
    }
}
