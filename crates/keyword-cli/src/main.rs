//! Keyword Planner
//!
//! Chooses blog keywords so that every topic cluster gets covered.
//!
//! # Usage
//!
//! ```bash
//! keyword-planner next [--record]
//! keyword-planner record "screen readers"
//! keyword-planner report [--json]
//! keyword-planner update
//! keyword-planner related wcag --limit 5
//! keyword-planner status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/keyword-planner/config.toml)
//! 3. Environment variables (KEYWORD_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use keyword_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
