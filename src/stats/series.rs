use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::counters::cumulative;
use crate::db::{MemberRecord, WasteDatabase};

const STAFF: &str = "Staff";
const STUDENT: &str = "Student";

/// Member attribute to group a wastage time series by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grouping {
    House,
    YearGroup,
    /// Form-class names repeat across year groups, so a form-class series is
    /// only meaningful within an explicit set of year groups.
    FormClass { year_groups: Vec<String> },
    /// Staff vs. student, derived from the year-group attribute: students
    /// carry a numbered year group (Y7, 12, ...), staff don't.
    Role,
}

fn group_key(grouping: &Grouping, member: &MemberRecord) -> Option<String> {
    match grouping {
        Grouping::House => member.house.clone(),
        Grouping::YearGroup => member.yeargroup.clone(),
        Grouping::FormClass { year_groups } => {
            let yeargroup = member.yeargroup.as_ref()?;
            if !year_groups.iter().any(|allowed| allowed == yeargroup) {
                return None;
            }
            member.formclass.clone()
        }
        Grouping::Role => {
            if !member.has_attributes() {
                return None;
            }
            match &member.yeargroup {
                Some(yeargroup) if yeargroup.chars().any(|c| c.is_ascii_digit()) => {
                    Some(STUDENT.to_string())
                }
                _ => Some(STAFF.to_string()),
            }
        }
    }
}

/// Daily wastage totals and contributing-member counts per category value.
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct CategorySeries {
    /// Grams weighed per category per day
    pub daily_totals: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    /// Members that were weighed per category per day
    pub daily_member_counts: BTreeMap<String, BTreeMap<NaiveDate, u64>>,
}

/// Accumulates, for each category value, the weighings of every member-day in
/// range. Members the grouping attribute is unknown for are left out.
pub fn category_series(
    db: &WasteDatabase,
    grouping: &Grouping,
    start: NaiveDate,
    end: NaiveDate,
) -> CategorySeries {
    let mut series = CategorySeries::default();
    for (_, member) in db.members() {
        let Some(key) = group_key(grouping, member) else {
            continue;
        };
        for (&day, record) in member.days.range(start..=end) {
            if !record.has_weights() {
                continue;
            }
            let total: f64 = record.weights.iter().sum();
            *series
                .daily_totals
                .entry(key.clone())
                .or_default()
                .entry(day)
                .or_default() += total;
            *series
                .daily_member_counts
                .entry(key.clone())
                .or_default()
                .entry(day)
                .or_default() += 1;
        }
    }
    series
}

impl CategorySeries {
    /// Running totals per category, zero-filled so every series spans the
    /// whole requested range.
    pub fn cumulative_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
        self.daily_totals
            .iter()
            .map(|(key, totals)| (key.clone(), cumulative(totals, start, end)))
            .collect()
    }

    /// Grams per contributing member per day. Days without contributing
    /// members are omitted rather than divided by zero.
    pub fn daily_average_per_member(&self) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
        self.daily_totals
            .iter()
            .map(|(key, totals)| {
                let counts = &self.daily_member_counts[key];
                let averages = totals
                    .iter()
                    .map(|(day, total)| (*day, total / counts[day] as f64))
                    .collect();
                (key.clone(), averages)
            })
            .collect()
    }
}
