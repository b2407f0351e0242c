//! Configuration loading for the keyword planner.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/keyword-planner/config.toml.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KeywordError;

/// Name of the topic type that earns the largest selection bonus.
pub const SPECIFIC_TOPIC_TYPE: &str = "specific";

/// Name of the topic type that earns the second largest selection bonus.
pub const TECHNICAL_TOPIC_TYPE: &str = "technical";

/// Community detection strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringStrategyKind {
    /// Modularity-based multi-level community detection
    #[default]
    Louvain,
    /// One cluster per connected component
    Components,
}

/// Clustering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    /// Preferred strategy; connected components is always the fallback
    #[serde(default)]
    pub strategy: ClusteringStrategyKind,

    /// Modularity resolution (1.0 = standard modularity)
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Maximum number of aggregation levels
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,
}

fn default_resolution() -> f64 {
    1.0
}

fn default_max_levels() -> usize {
    16
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            strategy: ClusteringStrategyKind::default(),
            resolution: default_resolution(),
            max_levels: default_max_levels(),
        }
    }
}

impl ClusteringSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(format!("resolution must be > 0, got {}", self.resolution));
        }
        if self.max_levels == 0 {
            return Err("max_levels must be > 0".to_string());
        }
        Ok(())
    }
}

/// A coarse topic type recognized by substring patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicTypeSettings {
    /// Type name (e.g. "technical")
    pub name: String,
    /// Lowercase substrings that mark a keyword as this type
    pub patterns: Vec<String>,
}

impl TopicTypeSettings {
    fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn default_topic_types() -> Vec<TopicTypeSettings> {
    vec![
        TopicTypeSettings::new("overview", &["guide", "introduction", "basics", "101"]),
        TopicTypeSettings::new(
            TECHNICAL_TOPIC_TYPE,
            &["implementation", "code", "development", "testing"],
        ),
        TopicTypeSettings::new("compliance", &["wcag", "ada", "section 508", "standards"]),
        TopicTypeSettings::new(
            SPECIFIC_TOPIC_TYPE,
            &["screen readers", "keyboard navigation", "color contrast"],
        ),
        TopicTypeSettings::new(
            "industry",
            &["healthcare", "education", "finance", "e-commerce"],
        ),
        TopicTypeSettings::new("impact", &["benefits", "roi", "case studies", "statistics"]),
    ]
}

/// LLM relationship inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Use the LLM oracle when an API key is available
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider name ("openai" or "anthropic")
    #[serde(default = "default_inference_provider")]
    pub provider: String,

    /// Model name
    #[serde(default = "default_inference_model")]
    pub model: String,

    /// API key (usually from KEYWORD_INFERENCE__API_KEY or OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL override
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Attempts per inference call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Existing keywords sent as context
    #[serde(default = "default_max_existing_keywords")]
    pub max_existing_keywords: usize,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_inference_provider() -> String {
    "openai".to_string()
}

fn default_inference_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_existing_keywords() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            provider: default_inference_provider(),
            model: default_inference_model(),
            api_key: None,
            api_base_url: None,
            max_attempts: default_max_attempts(),
            max_existing_keywords: default_max_existing_keywords(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InferenceSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }
        match self.provider.as_str() {
            "openai" | "anthropic" => Ok(()),
            other => Err(format!("unknown inference provider: {other}")),
        }
    }
}

/// A core topic kept in regular rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoreTopic {
    /// Keyword returned when the topic is due
    pub main: String,
    /// Phrasings that also count as this topic
    #[serde(default)]
    pub variations: Vec<String>,
}

impl CoreTopic {
    fn new(main: &str, variations: &[&str]) -> Self {
        Self {
            main: main.to_string(),
            variations: variations.iter().map(|v| v.to_string()).collect(),
        }
    }
}

fn default_core_topics() -> Vec<CoreTopic> {
    vec![
        CoreTopic::new(
            "Web Accessibility",
            &["Website Accessibility", "Digital Accessibility"],
        ),
        CoreTopic::new("WCAG Compliance", &["WCAG Guidelines", "WCAG Standards"]),
        CoreTopic::new("ADA Compliance", &["ADA Requirements", "ADA Standards"]),
    ]
}

/// Core topic rotation (opt-in).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Disabled by default
    #[serde(default)]
    pub enabled: bool,

    /// A core topic is due at least once every `interval` selections
    #[serde(default = "default_rotation_interval")]
    pub interval: usize,

    /// Topics in rotation
    #[serde(default = "default_core_topics")]
    pub core_topics: Vec<CoreTopic>,
}

fn default_rotation_interval() -> usize {
    4
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_rotation_interval(),
            core_topics: default_core_topics(),
        }
    }
}

impl RotationSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval < 2 {
            return Err(format!("interval must be >= 2, got {}", self.interval));
        }
        if self.enabled && self.core_topics.is_empty() {
            return Err("rotation enabled without core topics".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the topology and usage files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory scanned for keywords
    #[serde(default = "default_context_dir")]
    pub context_dir: String,

    /// Topology file name inside data_dir
    #[serde(default = "default_topology_file")]
    pub topology_file: String,

    /// Usage history file name inside data_dir
    #[serde(default = "default_usage_file")]
    pub usage_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Days before a used keyword becomes available again
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: u32,

    /// Days of history considered for topic-type diversity
    #[serde(default = "default_diversity_lookback_days")]
    pub diversity_lookback_days: u32,

    /// Returned when nothing better can be selected
    #[serde(default = "default_topic")]
    pub default_topic: String,

    /// Topic types used for diversity and scoring
    #[serde(default = "default_topic_types")]
    pub topic_types: Vec<TopicTypeSettings>,

    /// Clustering configuration
    #[serde(default)]
    pub clustering: ClusteringSettings,

    /// Relationship inference configuration
    #[serde(default)]
    pub inference: InferenceSettings,

    /// Core topic rotation
    #[serde(default)]
    pub rotation: RotationSettings,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_context_dir() -> String {
    "./context".to_string()
}

fn default_topology_file() -> String {
    "keyword_topology.json".to_string()
}

fn default_usage_file() -> String {
    "keyword_usage.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cooldown_days() -> u32 {
    30
}

fn default_diversity_lookback_days() -> u32 {
    14
}

fn default_topic() -> String {
    "Web Accessibility".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            context_dir: default_context_dir(),
            topology_file: default_topology_file(),
            usage_file: default_usage_file(),
            log_level: default_log_level(),
            cooldown_days: default_cooldown_days(),
            diversity_lookback_days: default_diversity_lookback_days(),
            default_topic: default_topic(),
            topic_types: default_topic_types(),
            clustering: ClusteringSettings::default(),
            inference: InferenceSettings::default(),
            rotation: RotationSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/keyword-planner/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (KEYWORD_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, KeywordError> {
        let config_dir = ProjectDirs::from("", "", "keyword-planner")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .set_default("context_dir", default_context_dir())
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .set_default("cooldown_days", default_cooldown_days() as i64)
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .set_default(
                "diversity_lookback_days",
                default_diversity_lookback_days() as i64,
            )
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .set_default("default_topic", default_topic())
            .map_err(|e| KeywordError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // KEYWORD_COOLDOWN_DAYS, KEYWORD_INFERENCE__API_KEY, ...
        builder = builder.add_source(
            Environment::with_prefix("KEYWORD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| KeywordError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| KeywordError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), KeywordError> {
        if self.default_topic.trim().is_empty() {
            return Err(KeywordError::Config("default_topic must not be empty".into()));
        }
        self.clustering
            .validate()
            .and_then(|_| self.inference.validate())
            .and_then(|_| self.rotation.validate())
            .map_err(KeywordError::Config)
    }

    /// Data directory with `~` expanded.
    pub fn expanded_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    /// Context directory with `~` expanded.
    pub fn expanded_context_dir(&self) -> PathBuf {
        expand_home(&self.context_dir)
    }

    /// Full path of the topology file.
    pub fn topology_path(&self) -> PathBuf {
        self.expanded_data_dir().join(&self.topology_file)
    }

    /// Full path of the usage history file.
    pub fn usage_path(&self) -> PathBuf {
        self.expanded_data_dir().join(&self.usage_file)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
