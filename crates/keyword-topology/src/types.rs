//! Keyword table: the set of known keywords in insertion order.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use keyword_types::{normalize_keyword, ExtractedKeyword, KeywordRecord, Priority};

/// Result of merging an extracted keyword into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Keyword was not known before
    Added,
    /// Priority or frequency changed
    Updated,
    /// Nothing changed
    Unchanged,
    /// Keyword text was blank after normalization
    Ignored,
}

/// Known keywords with their metadata, in first-seen order.
///
/// Keys are normalized on every lookup and insert. Keywords are never
/// removed; re-extraction only updates priority and frequency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordTable {
    order: Vec<String>,
    records: HashMap<String, KeywordRecord>,
}

impl KeywordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known keywords.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no keyword is known.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check whether a keyword is known.
    pub fn contains(&self, keyword: &str) -> bool {
        self.records.contains_key(&normalize_keyword(keyword))
    }

    /// Get the metadata of a keyword.
    pub fn get(&self, keyword: &str) -> Option<&KeywordRecord> {
        self.records.get(&normalize_keyword(keyword))
    }

    /// Priority of a keyword, medium when unknown.
    pub fn priority_of(&self, keyword: &str) -> Priority {
        self.get(keyword).map(|r| r.priority).unwrap_or_default()
    }

    /// Keywords in insertion order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Keywords with metadata in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeywordRecord)> {
        self.order
            .iter()
            .filter_map(|k| self.records.get(k).map(|r| (k.as_str(), r)))
    }

    /// Insert a keyword unless it is already known. Returns true when inserted.
    pub fn insert(&mut self, keyword: &str, record: KeywordRecord) -> bool {
        let key = normalize_keyword(keyword);
        if key.is_empty() || self.records.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.records.insert(key, record);
        true
    }

    /// Merge an extraction result into the table.
    ///
    /// New keywords keep the extractor's source and `now` as their added
    /// date. Known keywords only take the new priority and frequency.
    pub fn upsert(&mut self, extracted: &ExtractedKeyword, now: DateTime<Utc>) -> UpsertOutcome {
        let key = normalize_keyword(&extracted.keyword);
        if key.is_empty() {
            return UpsertOutcome::Ignored;
        }
        match self.records.get_mut(&key) {
            Some(record) => {
                if record.priority == extracted.priority && record.frequency == extracted.frequency
                {
                    UpsertOutcome::Unchanged
                } else {
                    record.priority = extracted.priority;
                    record.frequency = extracted.frequency;
                    UpsertOutcome::Updated
                }
            }
            None => {
                let record = KeywordRecord::new(
                    extracted.priority,
                    extracted.source.clone(),
                    extracted.frequency,
                    now,
                );
                self.order.push(key.clone());
                self.records.insert(key, record);
                UpsertOutcome::Added
            }
        }
    }
}

impl Serialize for KeywordTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (keyword, record) in self.iter() {
            map.serialize_entry(keyword, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeywordTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = KeywordTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of keyword to keyword metadata")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = KeywordTable::new();
                // Case variants collapse onto the first spelling seen
                while let Some((keyword, record)) =
                    access.next_entry::<String, KeywordRecord>()?
                {
                    table.insert(&keyword, record);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
