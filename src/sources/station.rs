use anyhow::{ensure, Context as _, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::translator::{IdTranslator, ScaleId, UNMATCHED_SENTINEL};

const ID_COLUMN: &str = "card_id";
const COUNTER_COLUMN: &str = "counter";

/// One point-of-sale visit as recorded by the till export. The card id is kept
/// raw (including the "No Match" placeholder); translation is the merge's job.
#[derive(Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct StationVisit {
    pub card_id: String,
    pub counter: String,
}

/// Source of per-day station visit records.
pub trait StationLedger {
    /// Visits recorded on `day`, in till order. `None` means the day has no
    /// export at all.
    fn visits_for_day(&self, day: NaiveDate) -> Result<Option<Vec<StationVisit>>>;
}

/// Reads the till exports: one CSV file per day in the data directory, named
/// `{prefix}{YYYY-MM-DD}.csv`.
pub struct CsvStationLedger {
    data_dir: PathBuf,
    file_prefix: String,
}

impl CsvStationLedger {
    pub fn new(data_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("{}{}.csv", self.file_prefix, day.format("%Y-%m-%d")))
    }
}

impl StationLedger for CsvStationLedger {
    fn visits_for_day(&self, day: NaiveDate) -> Result<Option<Vec<StationVisit>>> {
        let path = self.day_path(day);
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                log::warn!(
                    "Treating {day} as having no station data, cannot open {}: {err}",
                    path.display()
                );
                return Ok(None);
            }
        };
        let visits = read_visits(file)
            .with_context(|| format!("Malformed station file {}", path.display()))?;
        Ok(Some(visits))
    }
}

fn read_visits(input: impl Read) -> Result<Vec<StationVisit>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    for column in [ID_COLUMN, COUNTER_COLUMN] {
        ensure!(
            headers.iter().any(|header| header == column),
            "missing required column {column:?}"
        );
    }
    let mut visits = Vec::new();
    for row in reader.deserialize() {
        visits.push(row?);
    }
    Ok(visits)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub total: u64,
    pub no_match: u64,
}

/// Rewrites a station export whose id column carries scale ids into the
/// canonical card-id form. Untranslatable ids become the "No Match"
/// placeholder, which the merge later skips and tallies.
pub fn rewrite_export(
    input: &Path,
    output: &Path,
    translator: &IdTranslator,
) -> Result<RewriteOutcome> {
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open station export {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let id_index = headers
        .iter()
        .position(|header| header == ID_COLUMN)
        .with_context(|| {
            format!(
                "Station export {} is missing the {ID_COLUMN:?} column",
                input.display()
            )
        })?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&headers)?;

    let mut outcome = RewriteOutcome::default();
    for row in reader.records() {
        let row = row?;
        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        outcome.total += 1;
        let card = ScaleId::parse(&fields[id_index])
            .ok()
            .and_then(|scale| translator.reverse(scale));
        match card {
            Some(card) => fields[id_index] = card.as_str().to_string(),
            None => {
                fields[id_index] = UNMATCHED_SENTINEL.to_string();
                outcome.no_match += 1;
            }
        }
        writer.write_record(&fields)?;
    }
    writer.flush()?;

    Ok(outcome)
}
