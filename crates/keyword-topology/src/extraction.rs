//! Keyword extraction from context documents.
//!
//! ## Sources
//!
//! - CSV keyword research sheets: one keyword per row, with an optional
//!   search volume column. Volume above 100 marks a keyword high priority.
//! - Markdown and text notes: `* **Term:**` bullets inside a
//!   "High-Value Keywords" section are high priority; any other bold span
//!   is medium priority.
//!
//! Keywords seen more than twice across all documents are promoted to high.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use keyword_types::{normalize_keyword, ExtractedKeyword, Priority};

use crate::error::TopologyError;

/// Section heading that marks high-value keyword bullets.
const HIGH_VALUE_SECTION: &str = "High-Value Keywords";

/// Search volume above which a CSV keyword is high priority.
const HIGH_VOLUME_THRESHOLD: u64 = 100;

/// Occurrence count above which a keyword is promoted to high priority.
const PROMOTION_FREQUENCY: u32 = 2;

/// Keywords this short or shorter are dropped.
const MIN_KEYWORD_LEN: usize = 3;

/// Bold spans outside this length range are not keywords.
const BOLD_LEN_RANGE: std::ops::RangeInclusive<usize> = 3..=50;

/// Fallback CSV column positions when headers are not recognized.
const CSV_KEYWORD_COLUMN: usize = 2;
const CSV_VOLUME_COLUMN: usize = 3;

/// Produces keywords for a topology update.
pub trait KeywordExtractor: Send + Sync {
    fn extract(&self) -> Result<Vec<ExtractedKeyword>, TopologyError>;
}

/// Returns a fixed keyword list.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    keywords: Vec<ExtractedKeyword>,
}

impl StaticExtractor {
    pub fn new(keywords: Vec<ExtractedKeyword>) -> Self {
        Self { keywords }
    }
}

impl KeywordExtractor for StaticExtractor {
    fn extract(&self) -> Result<Vec<ExtractedKeyword>, TopologyError> {
        Ok(self.keywords.clone())
    }
}

/// A single sighting of a keyword in a document.
#[derive(Debug, Clone)]
struct Mention {
    keyword: String,
    priority: Priority,
    source: String,
}

/// Scans a context directory for `.md`, `.txt` and `.csv` files.
#[derive(Debug, Clone)]
pub struct ContextDirExtractor {
    root: PathBuf,
    bullet: Regex,
    bold: Regex,
}

impl ContextDirExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TopologyError> {
        let bullet = Regex::new(r"\*\s*\*\*([^:*\n]+):\*\*")
            .map_err(|e| TopologyError::Extraction(e.to_string()))?;
        let bold =
            Regex::new(r"\*\*([^*\n]+)\*\*").map_err(|e| TopologyError::Extraction(e.to_string()))?;
        Ok(Self {
            root: root.into(),
            bullet,
            bold,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract keywords from in-memory `(source, content)` documents.
    pub fn extract_documents(&self, documents: &[(String, String)]) -> Vec<ExtractedKeyword> {
        let mut mentions = Vec::new();
        for (source, content) in documents {
            if source.to_lowercase().ends_with(".csv") {
                mentions.extend(self.csv_mentions(source, content));
            } else {
                mentions.extend(self.markdown_mentions(source, content));
            }
        }
        aggregate(mentions)
    }

    fn csv_mentions(&self, source: &str, content: &str) -> Vec<Mention> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers: Vec<String> = match reader.headers() {
            Ok(h) => h.iter().map(normalize_keyword).collect(),
            Err(e) => {
                warn!(source, error = %e, "Unreadable CSV header");
                return Vec::new();
            }
        };
        let keyword_col = headers
            .iter()
            .position(|h| h == "keyword")
            .unwrap_or(CSV_KEYWORD_COLUMN);
        let volume_col = headers
            .iter()
            .position(|h| h == "volume" || h == "search volume")
            .unwrap_or(CSV_VOLUME_COLUMN);

        let mut mentions = Vec::new();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!(source, error = %e, "Skipping malformed CSV row");
                    continue;
                }
            };
            let Some(keyword) = row.get(keyword_col).map(str::trim).filter(|k| !k.is_empty())
            else {
                continue;
            };
            let volume: u64 = row
                .get(volume_col)
                .map(|v| v.trim().replace(',', ""))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let priority = if volume > HIGH_VOLUME_THRESHOLD {
                Priority::High
            } else {
                Priority::Medium
            };
            mentions.push(Mention {
                keyword: keyword.to_string(),
                priority,
                source: source.to_string(),
            });
        }
        mentions
    }

    fn markdown_mentions(&self, source: &str, content: &str) -> Vec<Mention> {
        let mut mentions = Vec::new();

        if let Some((_, rest)) = content.split_once(HIGH_VALUE_SECTION) {
            let section = rest.split("##").next().unwrap_or_default();
            for cap in self.bullet.captures_iter(section) {
                mentions.push(Mention {
                    keyword: cap[1].trim().to_string(),
                    priority: Priority::High,
                    source: source.to_string(),
                });
            }
        }

        for cap in self.bold.captures_iter(content) {
            let span = cap[1].trim();
            // `**Term:**` labels are handled by the bullet pattern
            if span.ends_with(':')
                || !BOLD_LEN_RANGE.contains(&span.chars().count())
                || span.starts_with("http")
            {
                continue;
            }
            mentions.push(Mention {
                keyword: span.to_string(),
                priority: Priority::Medium,
                source: source.to_string(),
            });
        }
        mentions
    }
}

impl KeywordExtractor for ContextDirExtractor {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn extract(&self) -> Result<Vec<ExtractedKeyword>, TopologyError> {
        if !self.root.is_dir() {
            return Err(TopologyError::Extraction(format!(
                "context directory not found: {}",
                self.root.display()
            )));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "md" | "txt" | "csv"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !supported {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let source = path
                        .strip_prefix(&self.root)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .into_owned();
                    documents.push((source, content));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }

        let keywords = self.extract_documents(&documents);
        info!(
            files = documents.len(),
            keywords = keywords.len(),
            "Extracted keywords from context"
        );
        Ok(keywords)
    }
}

/// Merge mentions into unique keywords.
fn aggregate(mentions: Vec<Mention>) -> Vec<ExtractedKeyword> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, ExtractedKeyword> = HashMap::new();

    for mention in mentions {
        let key = normalize_keyword(&mention.keyword);
        if key.chars().count() <= MIN_KEYWORD_LEN {
            continue;
        }
        match merged.get_mut(&key) {
            Some(existing) => {
                existing.frequency += 1;
                existing.priority = existing.priority.min(mention.priority);
            }
            None => {
                order.push(key.clone());
                merged.insert(
                    key.clone(),
                    ExtractedKeyword::new(&key, mention.priority, mention.source, 1),
                );
            }
        }
    }

    let mut keywords: Vec<ExtractedKeyword> = order
        .into_iter()
        .filter_map(|k| merged.remove(&k))
        .map(|mut kw| {
            if kw.frequency > PROMOTION_FREQUENCY && kw.priority > Priority::High {
                kw.priority = Priority::High;
            }
            kw
        })
        .collect();
    keywords.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    keywords
}
