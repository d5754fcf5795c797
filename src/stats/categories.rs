use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{DailyRecord, WasteDatabase};

/// The six mutually exclusive shapes a member-day record can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayShape {
    WeightsNoCounters,
    CountersNoWeights,
    Both,
    MultipleWeightsNoCounters,
    MultipleCountersNoWeights,
    MultipleBoth,
}

/// Multiple-shapes are checked before single-shapes; `Both` only applies when
/// neither multiple condition holds.
pub fn classify(record: &DailyRecord) -> Option<DayShape> {
    let has_weights = record.has_weights();
    let has_counters = record.has_stations();
    let multiple_weights = record.weights.len() > 1;
    let multiple_counters = record.stations.len() > 1;

    if multiple_weights && !has_counters {
        Some(DayShape::MultipleWeightsNoCounters)
    } else if multiple_counters && !has_weights {
        Some(DayShape::MultipleCountersNoWeights)
    } else if multiple_counters && multiple_weights {
        Some(DayShape::MultipleBoth)
    } else if has_weights && !has_counters {
        Some(DayShape::WeightsNoCounters)
    } else if has_counters && !has_weights {
        Some(DayShape::CountersNoWeights)
    } else if has_counters && has_weights {
        Some(DayShape::Both)
    } else {
        None
    }
}

/// How many member-day records fell into each shape, plus how often the
/// `Both` shape occurred on each day.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct CategoryCounts {
    pub weights_no_counters: u64,
    pub counters_no_weights: u64,
    pub both: u64,
    pub multiple_weights_no_counters: u64,
    pub multiple_counters_no_weights: u64,
    pub multiple_both: u64,
    pub both_per_day: BTreeMap<NaiveDate, u64>,
}

pub fn categorize(db: &WasteDatabase, start: NaiveDate, end: NaiveDate) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for (_, member) in db.members() {
        for (&day, record) in member.days.range(start..=end) {
            match classify(record) {
                Some(DayShape::WeightsNoCounters) => counts.weights_no_counters += 1,
                Some(DayShape::CountersNoWeights) => counts.counters_no_weights += 1,
                Some(DayShape::Both) => {
                    counts.both += 1;
                    *counts.both_per_day.entry(day).or_default() += 1;
                }
                Some(DayShape::MultipleWeightsNoCounters) => {
                    counts.multiple_weights_no_counters += 1
                }
                Some(DayShape::MultipleCountersNoWeights) => {
                    counts.multiple_counters_no_weights += 1
                }
                Some(DayShape::MultipleBoth) => counts.multiple_both += 1,
                None => {}
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::translator::CardId;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(stations: &[&str], weights: &[f64]) -> DailyRecord {
        DailyRecord {
            stations: stations.iter().map(|s| s.to_string()).collect(),
            weights: weights.to_vec(),
        }
    }

    #[rstest]
    #[case::weights_only(record(&[], &[50.0]), Some(DayShape::WeightsNoCounters))]
    #[case::counters_only(record(&["A"], &[]), Some(DayShape::CountersNoWeights))]
    #[case::one_of_each(record(&["A"], &[50.0]), Some(DayShape::Both))]
    #[case::multiple_weights_one_counter(record(&["A"], &[50.0, 30.0]), Some(DayShape::Both))]
    #[case::one_weight_multiple_counters(record(&["A", "B"], &[50.0]), Some(DayShape::Both))]
    #[case::multiple_weights_no_counters(
        record(&[], &[50.0, 30.0]),
        Some(DayShape::MultipleWeightsNoCounters)
    )]
    #[case::multiple_counters_no_weights(
        record(&["A", "B"], &[]),
        Some(DayShape::MultipleCountersNoWeights)
    )]
    #[case::multiple_both(record(&["A", "B"], &[50.0, 30.0]), Some(DayShape::MultipleBoth))]
    #[case::empty(record(&[], &[]), None)]
    fn classifies_each_shape(#[case] record: DailyRecord, #[case] expected: Option<DayShape>) {
        assert_eq!(expected, classify(&record));
    }

    #[test]
    fn counts_shapes_across_members_and_days() {
        let mut db = WasteDatabase::new();
        let member = db.member_mut(&CardId::new("001"));
        *member.day_mut(day("2024-05-13")) = record(&["A"], &[50.0]);
        *member.day_mut(day("2024-05-14")) = record(&["A", "B"], &[50.0, 30.0]);
        let member = db.member_mut(&CardId::new("002"));
        *member.day_mut(day("2024-05-13")) = record(&["A"], &[20.0]);
        *member.day_mut(day("2024-05-14")) = record(&[], &[10.0]);

        let counts = categorize(&db, day("2024-05-13"), day("2024-05-14"));
        assert_eq!(2, counts.both);
        assert_eq!(1, counts.multiple_both);
        assert_eq!(1, counts.weights_no_counters);
        assert_eq!(0, counts.counters_no_weights);
        assert_eq!(Some(&2), counts.both_per_day.get(&day("2024-05-13")));
        assert_eq!(None, counts.both_per_day.get(&day("2024-05-14")));
    }

    #[test]
    fn range_filter_applies() {
        let mut db = WasteDatabase::new();
        let member = db.member_mut(&CardId::new("001"));
        *member.day_mut(day("2024-05-13")) = record(&["A"], &[50.0]);
        *member.day_mut(day("2024-06-01")) = record(&["A"], &[50.0]);

        let counts = categorize(&db, day("2024-05-01"), day("2024-05-31"));
        assert_eq!(1, counts.both);
    }
}
