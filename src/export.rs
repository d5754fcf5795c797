use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

use crate::db::WasteDatabase;
use crate::stats::categories::{self, CategoryCounts};
use crate::stats::counters::{self, CounterReport};

/// Everything the chart-rendering layer needs for one date range: the merged
/// store itself plus the derived per-counter statistics and shape counts.
#[derive(Serialize)]
pub struct ChartData<'a> {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub members: &'a WasteDatabase,
    pub counters: CounterReport,
    pub categories: CategoryCounts,
}

pub fn chart_data(db: &WasteDatabase, start: NaiveDate, end: NaiveDate) -> ChartData<'_> {
    ChartData {
        start,
        end,
        members: db,
        counters: counters::counter_report(db, start, end),
        categories: categories::categorize(db, start, end),
    }
}

pub async fn write_chart_data(
    db: &WasteDatabase,
    start: NaiveDate,
    end: NaiveDate,
    path: &Path,
) -> Result<()> {
    let content = serde_json::to_vec_pretty(&chart_data(db, start, end))?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
