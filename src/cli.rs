//! Command-line interface argument parsing.
//!
//! Flags given here override the configuration file; see
//! [`Config::merge_with_args`](crate::config::Config::merge_with_args).

use clap::Parser;
use std::path::PathBuf;

/// NetWarden - autonomous health monitoring for network devices
///
/// Runs scheduled health checks against your routers, detects statistical
/// anomalies and lets a local LLM investigate them. Ask questions about the
/// fleet on stdin while it monitors.
///
/// Examples:
///   netwarden
///   netwarden --config ./lab.toml --model qwen2.5:14b
///   netwarden --no-monitor
///   netwarden --report --history --format json
///   netwarden --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for ./netwarden.toml, then ~/.netwarden/config.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ollama model to use
    #[arg(short, long, env = "NETWARDEN_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL", value_name = "URL")]
    pub ollama_url: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default netwarden.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Answer questions only; do not start scheduled checks
    #[arg(long)]
    pub no_monitor: bool,

    /// Print a findings report and exit
    #[arg(long)]
    pub report: bool,

    /// Include resolved findings in the report
    #[arg(long)]
    pub history: bool,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.history && !self.report {
            return Err("--history can only be used with --report".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
