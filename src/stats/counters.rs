use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Add;

use crate::db::WasteDatabase;

/// Per-counter wastage statistics over a date range. This is the payload the
/// chart layer consumes.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct CounterReport {
    /// Grams credited to each counter
    pub total_wastage: HashMap<String, f64>,
    /// Number of visits that contributed to the total
    pub tally: HashMap<String, u64>,
    /// Grams per contributing visit
    pub average_wastage: HashMap<String, f64>,
    pub purchases_per_day: HashMap<String, BTreeMap<NaiveDate, u64>>,
    pub daily_average_wastage: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

/// Computes the per-counter totals, tallies and averages for every member-day
/// in range that has both visits and weighings. A day with only one of the two
/// contributes nothing.
///
/// The scale cannot attribute waste to a specific counter, so a day's total is
/// split evenly across the counters visited that day. Downstream averages
/// build on this approximation.
pub fn counter_report(db: &WasteDatabase, start: NaiveDate, end: NaiveDate) -> CounterReport {
    let mut report = CounterReport::default();
    let mut daily_totals: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
    let mut daily_counts: HashMap<String, BTreeMap<NaiveDate, u64>> = HashMap::new();

    for (_, member) in db.members() {
        for (&day, record) in member.days.range(start..=end) {
            if !record.has_stations() || !record.has_weights() {
                continue;
            }
            let total_weight: f64 = record.weights.iter().sum();
            let weight_per_counter = total_weight / record.stations.len() as f64;

            for counter in &record.stations {
                *report.total_wastage.entry(counter.clone()).or_default() += weight_per_counter;
                *report.tally.entry(counter.clone()).or_default() += 1;
                *report
                    .purchases_per_day
                    .entry(counter.clone())
                    .or_default()
                    .entry(day)
                    .or_default() += 1;
                *daily_totals
                    .entry(counter.clone())
                    .or_default()
                    .entry(day)
                    .or_default() += weight_per_counter;
                *daily_counts
                    .entry(counter.clone())
                    .or_default()
                    .entry(day)
                    .or_default() += 1;
            }
        }
    }

    report.average_wastage = report
        .total_wastage
        .iter()
        .map(|(counter, total)| (counter.clone(), total / report.tally[counter] as f64))
        .collect();
    report.daily_average_wastage = daily_totals
        .into_iter()
        .map(|(counter, totals)| {
            let counts = &daily_counts[&counter];
            let averages = totals
                .into_iter()
                .map(|(day, total)| (day, total / counts[&day] as f64))
                .collect();
            (counter, averages)
        })
        .collect();

    report
}

/// Running sum over a daily series. Days absent from the series contribute 0
/// but still appear in the output, so it spans the whole requested range.
pub fn cumulative<T>(
    series: &BTreeMap<NaiveDate, T>,
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeMap<NaiveDate, T>
where
    T: Copy + Default + Add<Output = T>,
{
    let mut out = BTreeMap::new();
    let mut running = T::default();
    let mut day = start;
    while day <= end {
        running = running + series.get(&day).copied().unwrap_or_default();
        out.insert(day, running);
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    out
}
