use chrono::NaiveDate;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::translator::CardId;

const DATE_FORMAT: &str = "%Y-%m-%d";

const ATTR_NAME: &str = "name";
const ATTR_HOUSE: &str = "house";
const ATTR_YEARGROUP: &str = "yeargroup";
const ATTR_FORMCLASS: &str = "formclass";
const ATTR_BALANCE: &str = "balance";

/// Everything recorded for one member on one calendar day: the counters they
/// visited, in visit order, and the waste weighings taken, in grams.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DailyRecord {
    pub stations: Vec<String>,
    pub weights: Vec<f64>,
}

impl DailyRecord {
    pub fn has_stations(&self) -> bool {
        !self.stations.is_empty()
    }

    pub fn has_weights(&self) -> bool {
        !self.weights.is_empty()
    }
}

/// Member attributes as supplied by the weighing-scale service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberAttributes {
    pub name: Option<String>,
    pub house: Option<String>,
    pub yeargroup: Option<String>,
    pub formclass: Option<String>,
    pub balance: Option<f64>,
}

/// Per-day records for one member plus their attributes.
///
/// Attribute fields are filled by the first source that supplies them and are
/// never overwritten afterwards; members no source knows stay attribute-less.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberRecord {
    pub name: Option<String>,
    pub house: Option<String>,
    pub yeargroup: Option<String>,
    pub formclass: Option<String>,
    pub balance: Option<f64>,
    pub days: BTreeMap<NaiveDate, DailyRecord>,
}

impl MemberRecord {
    pub fn day_mut(&mut self, day: NaiveDate) -> &mut DailyRecord {
        self.days.entry(day).or_default()
    }

    pub fn fill_attributes_if_absent(&mut self, attributes: &MemberAttributes) {
        fn set_if_absent<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        set_if_absent(&mut self.name, &attributes.name);
        set_if_absent(&mut self.house, &attributes.house);
        set_if_absent(&mut self.yeargroup, &attributes.yeargroup);
        set_if_absent(&mut self.formclass, &attributes.formclass);
        set_if_absent(&mut self.balance, &attributes.balance);
    }

    pub fn has_attributes(&self) -> bool {
        self.name.is_some()
            || self.house.is_some()
            || self.yeargroup.is_some()
            || self.formclass.is_some()
            || self.balance.is_some()
    }
}

// The on-disk shape of a member is one flat JSON object whose keys are either
// ISO dates or one of the fixed attribute names, so (de)serialization is
// spelled out by hand instead of derived.
impl Serialize for MemberRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let num_attributes = [
            self.name.is_some(),
            self.house.is_some(),
            self.yeargroup.is_some(),
            self.formclass.is_some(),
            self.balance.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let mut map = serializer.serialize_map(Some(num_attributes + self.days.len()))?;
        if let Some(name) = &self.name {
            map.serialize_entry(ATTR_NAME, name)?;
        }
        if let Some(house) = &self.house {
            map.serialize_entry(ATTR_HOUSE, house)?;
        }
        if let Some(yeargroup) = &self.yeargroup {
            map.serialize_entry(ATTR_YEARGROUP, yeargroup)?;
        }
        if let Some(formclass) = &self.formclass {
            map.serialize_entry(ATTR_FORMCLASS, formclass)?;
        }
        if let Some(balance) = self.balance {
            map.serialize_entry(ATTR_BALANCE, &balance)?;
        }
        for (day, record) in &self.days {
            map.serialize_entry(&day.format(DATE_FORMAT).to_string(), record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MemberRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MemberRecordVisitor;

        impl<'de> Visitor<'de> for MemberRecordVisitor {
            type Value = MemberRecord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of ISO dates and member attributes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut record = MemberRecord::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        ATTR_NAME => record.name = Some(map.next_value()?),
                        ATTR_HOUSE => record.house = Some(map.next_value()?),
                        ATTR_YEARGROUP => record.yeargroup = Some(map.next_value()?),
                        ATTR_FORMCLASS => record.formclass = Some(map.next_value()?),
                        ATTR_BALANCE => record.balance = Some(map.next_value()?),
                        _ => {
                            let day = NaiveDate::parse_from_str(&key, DATE_FORMAT).map_err(|_| {
                                de::Error::custom(format_args!(
                                    "key {key:?} is neither an ISO date nor a member attribute"
                                ))
                            })?;
                            record.days.insert(day, map.next_value()?);
                        }
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(MemberRecordVisitor)
    }
}

/// The merged data set, keyed by card id. This is the sole persisted artifact
/// and the input to all aggregation; a merge run rebuilds it from scratch.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(transparent)]
pub struct WasteDatabase {
    members: BTreeMap<CardId, MemberRecord>,
}

impl WasteDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(&self, card: &CardId) -> Option<&MemberRecord> {
        self.members.get(card)
    }

    pub fn member_mut(&mut self, card: &CardId) -> &mut MemberRecord {
        self.members.entry(card.clone()).or_default()
    }

    pub fn members(&self) -> impl Iterator<Item = (&CardId, &MemberRecord)> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
