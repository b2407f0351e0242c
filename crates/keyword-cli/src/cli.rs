//! CLI argument parsing for the keyword planner.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Keyword Planner
///
/// Picks the next blog keyword from the least-covered topic cluster.
#[derive(Parser, Debug)]
#[command(name = "keyword-planner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/keyword-planner/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the data directory holding topology and usage files
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Planner commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the next keyword to write about
    Next {
        /// Record the selected keyword as used
        #[arg(short, long)]
        record: bool,
    },

    /// Record that a keyword was used
    Record {
        /// Keyword that was written about
        keyword: String,
    },

    /// Show coverage per priority and cluster
    Report {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Re-extract keywords from the context directory and recluster
    Update,

    /// List keywords related to a keyword
    Related {
        /// Keyword to look up
        keyword: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show planner state counts
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_next() {
        let cli = Cli::parse_from(["keyword-planner", "next"]);
        assert_eq!(cli.command, Commands::Next { record: false });
    }

    #[test]
    fn test_cli_next_record() {
        let cli = Cli::parse_from(["keyword-planner", "next", "--record"]);
        assert_eq!(cli.command, Commands::Next { record: true });
    }

    #[test]
    fn test_cli_record() {
        let cli = Cli::parse_from(["keyword-planner", "record", "screen readers"]);
        assert_eq!(
            cli.command,
            Commands::Record {
                keyword: "screen readers".to_string()
            }
        );
    }

    #[test]
    fn test_cli_report_json() {
        let cli = Cli::parse_from(["keyword-planner", "report", "--json"]);
        assert_eq!(cli.command, Commands::Report { json: true });
    }

    #[test]
    fn test_cli_related_limit() {
        let cli = Cli::parse_from(["keyword-planner", "related", "wcag", "-n", "3"]);
        match cli.command {
            Commands::Related { keyword, limit } => {
                assert_eq!(keyword, "wcag");
                assert_eq!(limit, 3);
            }
            _ => panic!("Expected Related command"),
        }
    }

    #[test]
    fn test_cli_related_default_limit() {
        let cli = Cli::parse_from(["keyword-planner", "related", "wcag"]);
        assert!(matches!(cli.command, Commands::Related { limit: 10, .. }));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "keyword-planner",
            "status",
            "--data-dir",
            "/tmp/kw",
            "--log-level",
            "debug",
            "--config",
            "/etc/kw.toml",
        ]);
        assert_eq!(cli.command, Commands::Status);
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/kw"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config.as_deref(), Some("/etc/kw.toml"));
    }

    #[test]
    fn test_cli_update() {
        let cli = Cli::parse_from(["keyword-planner", "update"]);
        assert_eq!(cli.command, Commands::Update);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["keyword-planner"]).is_err());
    }
}
