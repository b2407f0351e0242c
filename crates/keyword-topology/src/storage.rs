//! JSON persistence for the topology and usage history.
//!
//! Two files live in the data directory:
//!
//! - the topology document (keywords, clusters, relationships)
//! - the usage history (keyword -> list of timestamps)
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! crash mid-write never leaves a truncated file behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use keyword_types::{Relationship, Settings};

use crate::clusters::ClusterIndex;
use crate::error::TopologyError;
use crate::history::UsageHistory;
use crate::types::KeywordTable;

/// Version written into new topology documents.
pub const TOPOLOGY_VERSION: &str = "1.0";

fn default_version() -> String {
    TOPOLOGY_VERSION.to_string()
}

/// On-disk topology document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(
        alias = "lastUpdated",
        default = "Utc::now",
        with = "keyword_types::time::lenient"
    )]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub keywords: KeywordTable,
    #[serde(default)]
    pub clusters: ClusterIndex,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Default for TopologyDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            last_updated: Utc::now(),
            keywords: KeywordTable::new(),
            clusters: ClusterIndex::new(),
            relationships: Vec::new(),
        }
    }
}

/// File-backed store for planner state.
#[derive(Debug, Clone)]
pub struct TopologyStore {
    topology_path: PathBuf,
    usage_path: PathBuf,
}

impl TopologyStore {
    pub fn new(topology_path: impl Into<PathBuf>, usage_path: impl Into<PathBuf>) -> Self {
        Self {
            topology_path: topology_path.into(),
            usage_path: usage_path.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.topology_path(), settings.usage_path())
    }

    pub fn topology_path(&self) -> &Path {
        &self.topology_path
    }

    pub fn usage_path(&self) -> &Path {
        &self.usage_path
    }

    /// Load the topology. A missing file yields an empty document.
    #[instrument(skip(self), fields(path = %self.topology_path.display()))]
    pub fn load_topology(&self) -> Result<TopologyDocument, TopologyError> {
        match read_optional(&self.topology_path)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                debug!("No topology file, starting empty");
                Ok(TopologyDocument::default())
            }
        }
    }

    /// Persist the topology.
    #[instrument(skip_all, fields(path = %self.topology_path.display()))]
    pub fn save_topology(&self, document: &TopologyDocument) -> Result<(), TopologyError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        write_atomic(&self.topology_path, &bytes)
    }

    /// Load the usage history. A missing file yields an empty history.
    #[instrument(skip(self), fields(path = %self.usage_path.display()))]
    pub fn load_usage(&self) -> Result<UsageHistory, TopologyError> {
        match read_optional(&self.usage_path)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                debug!("No usage file, starting empty");
                Ok(UsageHistory::new())
            }
        }
    }

    /// Persist the usage history.
    #[instrument(skip_all, fields(path = %self.usage_path.display()))]
    pub fn save_usage(&self, history: &UsageHistory) -> Result<(), TopologyError> {
        let bytes = serde_json::to_vec_pretty(history)?;
        write_atomic(&self.usage_path, &bytes)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, TopologyError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TopologyError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    debug!(bytes = bytes.len(), "Wrote file");
    Ok(())
}
