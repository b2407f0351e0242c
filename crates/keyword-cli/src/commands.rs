//! Command implementations for the keyword planner CLI.
//!
//! Every command opens the planner from the persisted files, runs one
//! operation, writes its result to the given writer and closes the planner.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use keyword_inference::{LlmOracleConfig, LlmRelationshipOracle};
use keyword_topology::{CoverageReport, KeywordPlanner, PlannerDeps};
use keyword_types::Settings;

use crate::cli::{Cli, Commands};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    data_dir: Option<&str>,
    log_level: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir.to_string();
    }
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
/// Logs go to stderr so stdout carries only command output.
pub fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

/// Environment variable consulted when the settings carry no API key.
pub fn fallback_key_var(provider: &str) -> &'static str {
    match provider.trim().to_lowercase().as_str() {
        "anthropic" | "claude" => "ANTHROPIC_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// Build planner collaborators, attaching the LLM oracle when inference is
/// enabled and a key is available.
pub fn build_deps(settings: &Settings) -> Result<PlannerDeps> {
    let deps =
        PlannerDeps::from_settings(settings).context("Failed to build planner collaborators")?;

    if !settings.inference.enabled {
        debug!("Relationship inference disabled in configuration");
        return Ok(deps);
    }

    let fallback = std::env::var(fallback_key_var(&settings.inference.provider)).ok();
    match LlmOracleConfig::from_settings(&settings.inference, fallback) {
        Ok(config) => {
            info!(provider = %config.provider, model = %config.model, "Using LLM relationship inference");
            let oracle =
                LlmRelationshipOracle::new(config).context("Failed to build inference client")?;
            Ok(deps.with_oracle(Arc::new(oracle)))
        }
        Err(e) => {
            info!(reason = %e, "Relationship inference unavailable, new keywords get no edges");
            Ok(deps)
        }
    }
}

/// Entry point used by the binary.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(
        cli.config.as_deref(),
        cli.data_dir.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    let deps = build_deps(&settings)?;
    let mut out = std::io::stdout();
    run_command(&settings, deps, &cli.command, &mut out).await
}

/// Open the planner, run one command and close the planner.
///
/// Closing flushes state rebuilt while opening, such as recomputed clusters.
pub async fn run_command<W: Write>(
    settings: &Settings,
    deps: PlannerDeps,
    command: &Commands,
    out: &mut W,
) -> Result<()> {
    let planner = KeywordPlanner::open(settings, deps);
    let result = execute(&planner, command, out).await;
    planner.close().await.context("Failed to persist planner state")?;
    result
}

/// Run a single command against an open planner.
pub async fn execute<W: Write>(planner: &KeywordPlanner, command: &Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Next { record } => {
            let selection = planner.select_at(chrono::Utc::now()).await;
            writeln!(out, "{}", selection.keyword)?;
            if *record {
                planner.record_keyword_use(&selection.keyword).await;
            }
        }
        Commands::Record { keyword } => {
            planner.record_keyword_use(keyword).await;
            writeln!(out, "Recorded use of \"{}\"", keyword.trim())?;
        }
        Commands::Report { json } => {
            let report = planner.coverage_report().await;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &report)
                    .context("Failed to encode report")?;
                writeln!(out)?;
            } else {
                write_report(out, &report)?;
            }
        }
        Commands::Update => {
            let summary = planner.update_topology().await;
            writeln!(out, "Extracted:   {}", summary.extracted)?;
            writeln!(out, "Added:       {}", summary.added)?;
            writeln!(out, "Updated:     {}", summary.updated)?;
            writeln!(out, "Edges added: {}", summary.edges_added)?;
            writeln!(out, "Clusters:    {}", summary.clusters)?;
        }
        Commands::Related { keyword, limit } => {
            let neighbors = planner.related(keyword).await;
            if neighbors.is_empty() {
                writeln!(out, "No related keywords for \"{}\"", keyword.trim())?;
            }
            for n in neighbors.iter().take(*limit) {
                writeln!(
                    out,
                    "{}\t{}\t{:.2}\t{}",
                    n.keyword, n.kind, n.weight, n.priority
                )?;
            }
        }
        Commands::Status => {
            let status = planner.status().await;
            writeln!(out, "Keywords:      {}", status.keywords)?;
            writeln!(out, "Relationships: {}", status.relationships)?;
            writeln!(out, "Clusters:      {}", status.clusters)?;
            writeln!(out, "Used keywords: {}", status.used_keywords)?;
            writeln!(out, "Total uses:    {}", status.total_uses)?;
            writeln!(out, "Last updated:  {}", status.last_updated.to_rfc3339())?;
            writeln!(out, "Topology file: {}", status.topology_path.display())?;
            writeln!(out, "Usage file:    {}", status.usage_path.display())?;
        }
    }
    Ok(())
}

fn write_report<W: Write>(out: &mut W, report: &CoverageReport) -> Result<()> {
    writeln!(
        out,
        "Coverage: {}/{} keywords used ({:.1}%)",
        report.used_keywords, report.total_keywords, report.coverage_percent
    )?;

    if !report.priority_coverage.is_empty() {
        writeln!(out, "\nBy priority:")?;
        for (priority, cov) in &report.priority_coverage {
            writeln!(
                out,
                "  {:<9} {:>4}/{:<4} ({:.1}%)",
                priority.to_string(),
                cov.used,
                cov.total,
                cov.coverage_percent
            )?;
        }
    }

    if !report.cluster_coverage.is_empty() {
        writeln!(out, "\nBy cluster:")?;
        for (id, cov) in &report.cluster_coverage {
            writeln!(
                out,
                "  {:<9} {:>4}/{:<4} ({:.1}%)",
                id,
                cov.used_keywords,
                cov.total_keywords,
                cov.coverage * 100.0
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyword_topology::RelationshipOracle;
    use keyword_types::InferenceSettings;

    #[test]
    fn test_fallback_key_var() {
        assert_eq!(fallback_key_var("openai"), "OPENAI_API_KEY");
        assert_eq!(fallback_key_var("Anthropic"), "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_build_deps_with_inference_disabled() {
        let settings = Settings {
            inference: InferenceSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let deps = build_deps(&settings).unwrap();
        assert_eq!(deps.oracle.name(), "noop");
    }

    #[test]
    fn test_build_deps_with_configured_key() {
        let settings = Settings {
            inference: InferenceSettings {
                api_key: Some("sk-test".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let deps = build_deps(&settings).unwrap();
        assert_eq!(deps.oracle.name(), "openai");
    }
}
