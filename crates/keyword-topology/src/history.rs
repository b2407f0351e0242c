//! Keyword usage history with cooldown queries.
//!
//! Every time a keyword is used for a post, the current timestamp is
//! appended to its log. Logs are never reordered or truncated.
//!
//! ## Cooldown
//!
//! A keyword is available when it was never used, or when at least the
//! cooldown window has elapsed since its last use:
//!
//! ```text
//! available(k, D, now) = last_use(k) is None || now - last_use(k) >= D
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use keyword_types::normalize_keyword;

/// Convert a cooldown expressed in days into a duration.
pub fn days(days: u32) -> Duration {
    Duration::days(i64::from(days))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct Timestamps(#[serde(with = "keyword_types::time::lenient_vec")] Vec<DateTime<Utc>>);

/// Append-only per-keyword usage log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageHistory {
    entries: BTreeMap<String, Vec<DateTime<Utc>>>,
}

impl UsageHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a use of `keyword` now.
    pub fn record_use(&mut self, keyword: &str) -> DateTime<Utc> {
        self.record_use_at(keyword, Utc::now())
    }

    /// Record a use of `keyword` at `now`.
    ///
    /// Timestamps stay monotonic: a `now` earlier than the last recorded use
    /// is clamped to that last use. Returns the timestamp actually stored.
    pub fn record_use_at(&mut self, keyword: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let key = normalize_keyword(keyword);
        if key.is_empty() {
            debug!("Ignoring use of blank keyword");
            return now;
        }
        let log = self.entries.entry(key).or_default();
        let stamp = match log.last() {
            Some(last) if *last > now => {
                debug!(last = %last, now = %now, "Clamping backdated usage timestamp");
                *last
            }
            _ => now,
        };
        log.push(stamp);
        stamp
    }

    /// All recorded uses of a keyword, oldest first.
    pub fn uses(&self, keyword: &str) -> &[DateTime<Utc>] {
        self.entries
            .get(&normalize_keyword(keyword))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of recorded uses of a keyword.
    pub fn use_count(&self, keyword: &str) -> usize {
        self.uses(keyword).len()
    }

    /// True if the keyword was used at least once.
    pub fn has_been_used(&self, keyword: &str) -> bool {
        !self.uses(keyword).is_empty()
    }

    /// Timestamp of the most recent use.
    pub fn last_used(&self, keyword: &str) -> Option<DateTime<Utc>> {
        self.uses(keyword).last().copied()
    }

    /// Cooldown check against an explicit clock reading.
    ///
    /// Unknown keywords are always available.
    pub fn is_available_at(&self, keyword: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        match self.last_used(keyword) {
            None => true,
            Some(last) => now.signed_duration_since(last) >= cooldown,
        }
    }

    /// Cooldown check against the system clock.
    pub fn is_available(&self, keyword: &str, cooldown_days: u32) -> bool {
        self.is_available_at(keyword, days(cooldown_days), Utc::now())
    }

    /// Keywords whose last use falls within `lookback` of `now`.
    pub fn recent_keywords(&self, lookback: Duration, now: DateTime<Utc>) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(k, log)| {
                let last = log.last()?;
                (now.signed_duration_since(*last) < lookback).then_some(k.as_str())
            })
            .collect()
    }

    /// The `limit` most recent uses across all keywords, newest first.
    pub fn recent_uses(&self, limit: usize) -> Vec<(&str, DateTime<Utc>)> {
        let mut all: Vec<(&str, DateTime<Utc>)> = self
            .entries
            .iter()
            .flat_map(|(k, log)| log.iter().map(move |ts| (k.as_str(), *ts)))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        all.truncate(limit);
        all
    }

    /// Among `candidates`, the keyword with the oldest last use.
    ///
    /// Candidates that were never used are skipped. Ties go to the
    /// lexicographically smallest keyword.
    pub fn least_recently_used<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter_map(|k| self.last_used(k).map(|ts| (ts, k)))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, k)| k)
    }

    /// Keywords with at least one recorded use.
    pub fn tracked_keywords(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(k, _)| k.as_str())
    }

    /// True when nothing was ever recorded.
    pub fn is_empty(&self) -> bool {
        !self.has_any_history()
    }

    /// True when at least one use was recorded for any keyword.
    pub fn has_any_history(&self) -> bool {
        self.entries.values().any(|log| !log.is_empty())
    }

    /// Total number of recorded uses.
    pub fn total_uses(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl Serialize for UsageHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: BTreeMap<&str, Timestamps> = self
            .entries
            .iter()
            .map(|(k, log)| (k.as_str(), Timestamps(log.clone())))
            .collect();
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UsageHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Timestamps>::deserialize(deserializer)?;
        let mut entries: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
        for (keyword, Timestamps(stamps)) in raw {
            let key = normalize_keyword(&keyword);
            if key.is_empty() {
                continue;
            }
            entries.entry(key).or_default().extend(stamps);
        }
        // Merged case variants and hand-edited files may be out of order
        for log in entries.values_mut() {
            log.sort();
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_keyword_is_available() {
        let history = UsageHistory::new();
        assert!(history.is_available_at("anything", days(30), t0()));
        assert!(history.last_used("anything").is_none());
    }

    #[test]
    fn test_cooldown_window_boundaries() {
        let mut history = UsageHistory::new();
        history.record_use_at("Web Accessibility", t0());

        let cooldown = days(30);
        assert!(!history.is_available_at("web accessibility", cooldown, t0()));
        assert!(!history.is_available_at(
            "Web Accessibility",
            cooldown,
            t0() + Duration::days(29)
        ));
        assert!(!history.is_available_at(
            "Web Accessibility",
            cooldown,
            t0() + Duration::days(30) - Duration::seconds(1)
        ));
        assert!(history.is_available_at("Web Accessibility", cooldown, t0() + Duration::days(30)));
        assert!(history.is_available_at("Web Accessibility", cooldown, t0() + Duration::days(31)));
    }

    #[test]
    fn test_record_is_append_only_and_monotonic() {
        let mut history = UsageHistory::new();
        history.record_use_at("wcag", t0());
        let stored = history.record_use_at("WCAG", t0() - Duration::days(3));
        assert_eq!(stored, t0());
        history.record_use_at("wcag", t0() + Duration::days(1));

        let uses = history.uses("wcag");
        assert_eq!(uses.len(), 3);
        assert!(uses.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(history.last_used("wcag"), Some(t0() + Duration::days(1)));
    }

    #[test]
    fn test_recent_keywords_lookback() {
        let mut history = UsageHistory::new();
        history.record_use_at("old", t0());
        history.record_use_at("fresh", t0() + Duration::days(20));
        let now = t0() + Duration::days(25);
        let recent = history.recent_keywords(days(14), now);
        assert_eq!(recent, vec!["fresh"]);
    }

    #[test]
    fn test_least_recently_used_tie_break() {
        let mut history = UsageHistory::new();
        history.record_use_at("beta", t0());
        history.record_use_at("alpha", t0());
        history.record_use_at("gamma", t0() + Duration::days(1));
        let lru = history.least_recently_used(["gamma", "beta", "alpha", "never"]);
        assert_eq!(lru, Some("alpha"));
        assert_eq!(history.least_recently_used(["never"]), None);
    }

    #[test]
    fn test_recent_uses_newest_first() {
        let mut history = UsageHistory::new();
        history.record_use_at("a", t0());
        history.record_use_at("b", t0() + Duration::days(2));
        history.record_use_at("a", t0() + Duration::days(4));
        let recent = history.recent_uses(2);
        assert_eq!(recent[0].0, "a");
        assert_eq!(recent[1].0, "b");
    }

    #[test]
    fn test_deserialize_merges_case_variants() {
        let json = r#"{
            "WCAG": ["2024-05-03T10:00:00"],
            "wcag": ["2024-05-01T10:00:00Z"],
            "Screen Readers": []
        }"#;
        let history: UsageHistory = serde_json::from_str(json).unwrap();
        assert_eq!(history.use_count("wcag"), 2);
        assert!(history.uses("wcag")[0] < history.uses("wcag")[1]);
        assert!(!history.has_been_used("screen readers"));
        assert_eq!(history.tracked_keywords().collect::<Vec<_>>(), vec!["wcag"]);
    }

    #[test]
    fn test_serialize_shape() {
        let mut history = UsageHistory::new();
        history.record_use_at("wcag", t0());
        let value = serde_json::to_value(&history).unwrap();
        let stamps = value["wcag"].as_array().unwrap();
        assert_eq!(stamps.len(), 1);
        assert!(stamps[0].as_str().unwrap().starts_with("2025-01-01T09:00:00"));
    }
}
