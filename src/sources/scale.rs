use anyhow::{ensure, Context as _, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::db::MemberAttributes;
use crate::translator::ScaleId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One weighing event as returned by the scale service's `getrecord` endpoint.
/// Field names follow the service's wire format.
#[derive(Deserialize, Debug, Clone)]
pub struct WeightRecord {
    #[serde(rename = "peopleCard")]
    pub people_card: String,
    #[serde(rename = "addTime")]
    pub add_time: String,
    /// Grams
    pub weight: f64,
    #[serde(rename = "peopleName")]
    pub people_name: Option<String>,
    pub house: Option<String>,
    pub yeargroup: Option<String>,
    pub formclass: Option<String>,
    pub balance: Option<f64>,
}

/// Weighing events for a date range, grouped per day and per member, plus the
/// attribute side table keyed by scale id.
#[derive(Debug, Clone, Default)]
pub struct WeightBatch {
    per_day: BTreeMap<NaiveDate, BTreeMap<ScaleId, Vec<f64>>>,
    attributes: HashMap<ScaleId, MemberAttributes>,
    skipped_records: u64,
}

impl WeightBatch {
    pub fn from_records(records: Vec<WeightRecord>) -> Self {
        let mut batch = Self::default();
        for record in records {
            let scale_id = match ScaleId::parse(&record.people_card) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("Skipping weight record with bad member id: {err:#}");
                    batch.skipped_records += 1;
                    continue;
                }
            };
            let day = match parse_event_day(&record.add_time) {
                Ok(day) => day,
                Err(err) => {
                    log::warn!("Skipping weight record for {scale_id}: {err:#}");
                    batch.skipped_records += 1;
                    continue;
                }
            };
            batch
                .per_day
                .entry(day)
                .or_default()
                .entry(scale_id)
                .or_default()
                .push(record.weight);
            batch.attributes.entry(scale_id).or_insert(MemberAttributes {
                name: record.people_name,
                house: record.house,
                yeargroup: record.yeargroup,
                formclass: record.formclass,
                balance: record.balance,
            });
        }
        batch
    }

    pub fn events_for_day(&self, day: NaiveDate) -> Option<&BTreeMap<ScaleId, Vec<f64>>> {
        self.per_day.get(&day)
    }

    pub fn attributes(&self, scale_id: ScaleId) -> Option<&MemberAttributes> {
        self.attributes.get(&scale_id)
    }

    pub fn is_empty(&self) -> bool {
        self.per_day.is_empty()
    }

    pub fn skipped_records(&self) -> u64 {
        self.skipped_records
    }
}

fn parse_event_day(add_time: &str) -> Result<NaiveDate> {
    let date_part = add_time.split(' ').next().unwrap_or(add_time);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("bad event timestamp {add_time:?}"))
}

/// Client for the weighing-scale service.
pub struct ScaleClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ScaleClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    /// Fetch all weighing events in the date range (inclusive). Remote failures
    /// are logged and yield an empty batch; an unreachable scale service must
    /// not take the whole merge run down with it.
    pub async fn fetch_batch(&self, start: NaiveDate, end: NaiveDate) -> WeightBatch {
        match self.fetch_records(start, end).await {
            Ok(records) => WeightBatch::from_records(records),
            Err(err) => {
                log::warn!("Weight service unavailable, continuing without weight data: {err:#}");
                WeightBatch::default()
            }
        }
    }

    async fn fetch_records(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<WeightRecord>> {
        log::info!("Requesting weight records {start}..{end}...");

        let url = format!("{}/getrecord", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("beginTime", start.format("%Y-%m-%d").to_string()),
                ("endTime", end.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await
            .context("Request to the scale service failed")?;
        ensure!(
            response.status().is_success(),
            "Scale service returned {}",
            response.status()
        );
        let records: Vec<WeightRecord> = response
            .json()
            .await
            .context("Scale service returned invalid JSON")?;

        log::info!("Requesting weight records...done ({} records)", records.len());

        Ok(records)
    }
}
