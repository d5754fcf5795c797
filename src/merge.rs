use anyhow::{bail, ensure, Result};
use chrono::NaiveDate;

use crate::db::WasteDatabase;
use crate::sources::scale::WeightBatch;
use crate::sources::station::StationLedger;
use crate::translator::{CardId, IdTranslator};

/// Diagnostic counters emitted by a merge run. Reported in the post-merge
/// summary; not part of the persisted data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Station visits appended to the store
    pub station_visits_merged: u64,
    /// Station visits whose card id has no roster entry
    pub station_unmatched: u64,
    /// Station rows carrying the "No Match" placeholder
    pub station_sentinel: u64,
    /// Individual weight measurements appended to the store
    pub weight_measurements_merged: u64,
    /// Per-member weight entries whose scale id has no roster entry
    pub weight_unmatched: u64,
    pub days_with_station_data: u64,
    pub days_with_weight_data: u64,
    pub members: u64,
    pub members_with_attributes: u64,
}

/// Builds a fresh database from both sources over the date range (inclusive).
///
/// Each day is merged in two independent passes, stations first, weights
/// second; within a pass, events keep the order their loader supplied. A day
/// absent from both sources leaves no trace. If the whole range is absent from
/// both sources the run is aborted so an existing snapshot isn't replaced by
/// an empty one.
pub fn merge_range(
    translator: &IdTranslator,
    stations: &impl StationLedger,
    weights: &WeightBatch,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(WasteDatabase, MergeStats)> {
    ensure!(start <= end, "start date {start} is after end date {end}");

    let mut db = WasteDatabase::new();
    let mut stats = MergeStats::default();

    let mut day = start;
    while day <= end {
        merge_station_day(&mut db, &mut stats, translator, stations, weights, day)?;
        merge_weight_day(&mut db, &mut stats, translator, weights, day);
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }

    if stats.days_with_station_data == 0 && stats.days_with_weight_data == 0 {
        bail!("no station or weight data found between {start} and {end}");
    }

    stats.members = db.len() as u64;
    stats.members_with_attributes = db
        .members()
        .filter(|(_, member)| member.has_attributes())
        .count() as u64;

    Ok((db, stats))
}

fn merge_station_day(
    db: &mut WasteDatabase,
    stats: &mut MergeStats,
    translator: &IdTranslator,
    stations: &impl StationLedger,
    weights: &WeightBatch,
    day: NaiveDate,
) -> Result<()> {
    let Some(visits) = stations.visits_for_day(day)? else {
        return Ok(());
    };
    stats.days_with_station_data += 1;

    for visit in visits {
        let card = CardId::new(visit.card_id);
        if card.is_unmatched() {
            stats.station_sentinel += 1;
            continue;
        }
        let Some(scale_id) = translator.forward(&card) else {
            log::debug!("No roster entry for card {card}, skipping visit on {day}");
            stats.station_unmatched += 1;
            continue;
        };
        let member = db.member_mut(&card);
        member.day_mut(day).stations.push(visit.counter);
        if let Some(attributes) = weights.attributes(scale_id) {
            member.fill_attributes_if_absent(attributes);
        }
        stats.station_visits_merged += 1;
    }

    Ok(())
}

fn merge_weight_day(
    db: &mut WasteDatabase,
    stats: &mut MergeStats,
    translator: &IdTranslator,
    weights: &WeightBatch,
    day: NaiveDate,
) {
    let Some(events) = weights.events_for_day(day) else {
        return;
    };
    stats.days_with_weight_data += 1;

    for (&scale_id, measurements) in events {
        let Some(card) = translator.reverse(scale_id) else {
            log::debug!("No roster entry for scale id {scale_id}, skipping weights on {day}");
            stats.weight_unmatched += 1;
            continue;
        };
        let member = db.member_mut(card);
        member.day_mut(day).weights.extend_from_slice(measurements);
        if let Some(attributes) = weights.attributes(scale_id) {
            member.fill_attributes_if_absent(attributes);
        }
        stats.weight_measurements_merged += measurements.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use common_macros::hash_map;
    use std::collections::HashMap;

    use super::*;
    use crate::sources::scale::{WeightBatch, WeightRecord};
    use crate::sources::station::StationVisit;
    use crate::translator::ScaleId;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// In-memory station source
    struct FakeLedger {
        days: HashMap<NaiveDate, Vec<StationVisit>>,
    }

    impl FakeLedger {
        fn new(days: HashMap<NaiveDate, Vec<StationVisit>>) -> Self {
            Self { days }
        }

        fn empty() -> Self {
            Self::new(hash_map![])
        }
    }

    impl StationLedger for FakeLedger {
        fn visits_for_day(&self, day: NaiveDate) -> Result<Option<Vec<StationVisit>>> {
            Ok(self.days.get(&day).cloned())
        }
    }

    struct MalformedLedger;

    impl StationLedger for MalformedLedger {
        fn visits_for_day(&self, _day: NaiveDate) -> Result<Option<Vec<StationVisit>>> {
            Err(anyhow!("missing required column"))
        }
    }

    fn visit(card_id: &str, counter: &str) -> StationVisit {
        StationVisit {
            card_id: card_id.to_string(),
            counter: counter.to_string(),
        }
    }

    fn weight_record(card: &str, add_time: &str, weight: f64) -> WeightRecord {
        WeightRecord {
            people_card: card.to_string(),
            add_time: add_time.to_string(),
            weight,
            people_name: Some("Alex Doe".to_string()),
            house: Some("Fire".to_string()),
            yeargroup: Some("Y7".to_string()),
            formclass: Some("7A".to_string()),
            balance: None,
        }
    }

    fn translator() -> IdTranslator {
        IdTranslator::from_pairs(vec![
            (CardId::new("001"), ScaleId::new(500)),
            (CardId::new("002"), ScaleId::new(501)),
        ])
    }

    #[test]
    fn visit_and_weighings_land_in_one_daily_record() {
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("001", "A")],
        ]);
        let weights = WeightBatch::from_records(vec![
            weight_record("500", "2024-05-13 12:00:00", 50.0),
            weight_record("500", "2024-05-13 12:30:00", 30.0),
        ]);

        let (db, stats) = merge_range(
            &translator(),
            &ledger,
            &weights,
            day("2024-05-13"),
            day("2024-05-13"),
        )
        .unwrap();

        let record = &db.member(&CardId::new("001")).unwrap().days[&day("2024-05-13")];
        assert_eq!(vec!["A".to_string()], record.stations);
        assert_eq!(vec![50.0, 30.0], record.weights);
        assert_eq!(1, stats.station_visits_merged);
        assert_eq!(2, stats.weight_measurements_merged);
        assert_eq!(1, stats.members);
        assert_eq!(1, stats.members_with_attributes);
    }

    #[test]
    fn sentinel_rows_are_skipped_and_counted() {
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("No Match", "A"), visit("001", "B")],
        ]);

        let (db, stats) = merge_range(
            &translator(),
            &ledger,
            &WeightBatch::default(),
            day("2024-05-13"),
            day("2024-05-13"),
        )
        .unwrap();

        assert_eq!(1, stats.station_sentinel);
        assert_eq!(1, stats.station_visits_merged);
        assert_eq!(1, db.len());
        assert!(db.member(&CardId::new("No Match")).is_none());
    }

    #[test]
    fn untranslatable_station_visits_are_skipped_and_counted() {
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("999", "A")],
        ]);

        let result = merge_range(
            &translator(),
            &ledger,
            &WeightBatch::default(),
            day("2024-05-13"),
            day("2024-05-13"),
        );

        // The one visit is untranslatable, but the day still had station data,
        // so the run itself succeeds with an empty store.
        let (db, stats) = result.unwrap();
        assert_eq!(1, stats.station_unmatched);
        assert_eq!(0, stats.station_visits_merged);
        assert!(db.is_empty());
    }

    #[test]
    fn untranslatable_weights_never_create_a_member() {
        let weights = WeightBatch::from_records(vec![weight_record(
            "777",
            "2024-05-13 12:00:00",
            50.0,
        )]);

        let (db, stats) = merge_range(
            &translator(),
            &FakeLedger::empty(),
            &weights,
            day("2024-05-13"),
            day("2024-05-13"),
        )
        .unwrap();

        assert_eq!(1, stats.weight_unmatched);
        assert_eq!(0, stats.weight_measurements_merged);
        assert!(db.is_empty());
    }

    #[test]
    fn every_translatable_visit_is_stored_exactly_once() {
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("001", "A"), visit("002", "B"), visit("001", "B")],
            day("2024-05-14") => vec![visit("002", "A"), visit("999", "A")],
        ]);

        let (db, stats) = merge_range(
            &translator(),
            &ledger,
            &WeightBatch::default(),
            day("2024-05-13"),
            day("2024-05-15"),
        )
        .unwrap();

        let stored_visits: usize = db
            .members()
            .flat_map(|(_, member)| member.days.values())
            .map(|record| record.stations.len())
            .sum();
        assert_eq!(4, stored_visits);
        assert_eq!(4, stats.station_visits_merged);
        assert_eq!(2, stats.days_with_station_data);
    }

    #[test]
    fn days_absent_from_both_sources_leave_no_record() {
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("001", "A")],
        ]);
        let weights = WeightBatch::from_records(vec![weight_record(
            "500",
            "2024-05-15 12:00:00",
            50.0,
        )]);

        let (db, _) = merge_range(
            &translator(),
            &ledger,
            &weights,
            day("2024-05-13"),
            day("2024-05-16"),
        )
        .unwrap();

        let member = db.member(&CardId::new("001")).unwrap();
        assert_eq!(
            vec![day("2024-05-13"), day("2024-05-15")],
            member.days.keys().copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn empty_range_is_a_terminal_error() {
        let result = merge_range(
            &translator(),
            &FakeLedger::empty(),
            &WeightBatch::default(),
            day("2024-05-13"),
            day("2024-05-20"),
        );
        assert!(result.unwrap_err().to_string().contains("no station or weight data"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let result = merge_range(
            &translator(),
            &FakeLedger::empty(),
            &WeightBatch::default(),
            day("2024-05-20"),
            day("2024-05-13"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn malformed_station_source_is_fatal() {
        let result = merge_range(
            &translator(),
            &MalformedLedger,
            &WeightBatch::default(),
            day("2024-05-13"),
            day("2024-05-13"),
        );
        assert!(result.unwrap_err().to_string().contains("missing required column"));
    }

    #[test]
    fn attributes_come_out_the_same_whichever_source_triggers_them() {
        let weights = WeightBatch::from_records(vec![weight_record(
            "500",
            "2024-05-13 12:00:00",
            50.0,
        )]);

        // Station visit present: attributes arrive during the station pass
        let ledger = FakeLedger::new(hash_map![
            day("2024-05-13") => vec![visit("001", "A")],
        ]);
        let (with_stations, _) = merge_range(
            &translator(),
            &ledger,
            &weights,
            day("2024-05-13"),
            day("2024-05-13"),
        )
        .unwrap();

        // No station visit: attributes arrive during the weight pass
        let (weights_only, _) = merge_range(
            &translator(),
            &FakeLedger::empty(),
            &weights,
            day("2024-05-13"),
            day("2024-05-13"),
        )
        .unwrap();

        let card = CardId::new("001");
        let a = with_stations.member(&card).unwrap();
        let b = weights_only.member(&card).unwrap();
        assert_eq!(Some("Alex Doe"), a.name.as_deref());
        assert_eq!((&a.name, &a.house, &a.yeargroup, &a.formclass), (&b.name, &b.house, &b.yeargroup, &b.formclass));
    }
}
