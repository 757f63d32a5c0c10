//! NetWarden - autonomous health monitoring agent for network devices
//!
//! Runs scheduled health checks, investigates anomalies with a local LLM
//! through Ollama, and answers operator questions on stdin.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup error (configuration, storage, LLM client)

use anyhow::{Context, Result};
use async_trait::async_trait;
use netwarden::agent::{
    AgentCore, AgentSettings, AnomalyConfig, FindingNotifier, FindingsTracker, HeartbeatManager,
    MarkdownMemory, SqliteMetricsStore,
};
use netwarden::checks::CheckRegistry;
use netwarden::cli::{Args, OutputFormat};
use netwarden::config::Config;
use netwarden::device::CommandDeviceManager;
use netwarden::llm::{OllamaClient, OllamaConfig};
use netwarden::metrics::ExtractorSet;
use netwarden::models::Finding;
use netwarden::report::{self, FindingsReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const REPORT_HISTORY_LIMIT: usize = 500;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("NetWarden v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("NetWarden failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle --init-config: generate a default netwarden.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new("netwarden.toml");

    if path.exists() {
        eprintln!("⚠️  netwarden.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml()).context("Failed to write netwarden.toml")?;

    println!("✅ Created netwarden.toml with default settings.");
    println!("   Add your [[devices]] and adjust schedules, checks and metric rules.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Prints new and resolved findings to the console.
struct ConsoleNotifier;

#[async_trait]
impl FindingNotifier for ConsoleNotifier {
    async fn notify(&self, finding: &Finding, is_new: bool) {
        if is_new {
            println!(
                "\n{} [{}] {} ({}): {}",
                finding.severity.emoji(),
                finding.severity.as_str().to_uppercase(),
                finding.device,
                finding.category,
                finding.title
            );
            if !finding.recommendation.is_empty() {
                println!("   💡 {}", finding.recommendation);
            }
        } else {
            println!(
                "\n✅ Resolved on {} ({}): {}",
                finding.device, finding.category, finding.title
            );
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::resolve(args.config.as_deref())?;
    config.merge_with_args(&args);

    let storage = config.general.storage_dir();
    std::fs::create_dir_all(&storage)
        .with_context(|| format!("Failed to create storage directory: {}", storage.display()))?;

    let findings = FindingsTracker::open(&storage).context("Failed to open findings database")?;

    if args.report {
        return print_report(findings, args.history, args.format).await;
    }

    let metrics = Arc::new(
        SqliteMetricsStore::open(&storage, config.metrics.retention_days)
            .context("Failed to open metrics database")?,
    );
    let extractors = ExtractorSet::from_rules(&config.metrics.rules)?;
    if extractors.is_empty() {
        warn!("No metric rules configured; every check cycle will be sent to the LLM");
    } else {
        debug!("Metric extractors loaded for {} categories", extractors.len());
    }
    let devices = Arc::new(CommandDeviceManager::new(config.devices.clone()));
    let checks = Arc::new(CheckRegistry::new(config.checks.clone(), devices.clone()));
    let llm = Arc::new(OllamaClient::new(OllamaConfig {
        base_url: config.llm.base_url.clone(),
        model: config.llm.model.clone(),
        temperature: config.llm.temperature,
        timeout_seconds: config.llm.timeout_seconds,
    })?);

    let heartbeat = Arc::new(HeartbeatManager::new(config.heartbeat_path()));
    debug!("Heartbeat checklist: {}", heartbeat.path().display());

    let mut builder = AgentCore::builder(llm, devices, checks, findings)
        .settings(AgentSettings::from_config(&config))
        .extractors(extractors)
        .metrics_store(
            metrics,
            AnomalyConfig {
                z_threshold: config.metrics.anomaly_z_threshold,
                window_hours: config.metrics.anomaly_window_hours,
                min_samples: config.metrics.anomaly_min_samples,
            },
        )
        .heartbeat(heartbeat)
        .schedule(config.schedule.clone(), config.device_schedules.clone());

    if config.correlation.enabled {
        builder = builder.correlation(Duration::from_secs_f64(config.correlation.window_seconds.max(0.0)));
    }
    if config.memory.enabled {
        builder = builder.memory(Arc::new(MarkdownMemory::new(
            storage.join("memory"),
            config.memory.max_file_size,
            config.memory.max_total_size,
        )));
    }

    let core = builder.build();
    core.set_notifier(Arc::new(ConsoleNotifier));

    println!("🛰️  NetWarden");
    println!("   Model: {}", config.llm.model);
    println!("   Ollama: {}", config.llm.base_url);
    println!("   Devices: {}", config.devices.len());
    println!("   Storage: {}", storage.display());

    if args.no_monitor {
        println!("   Monitoring: off (--no-monitor)");
    } else {
        core.start_monitoring().await;
    }

    println!("\nAsk about your network, or type 'exit' to quit.\n");
    let result = repl(&core).await;

    println!("\n👋 Shutting down...");
    core.stop_monitoring().await;
    result
}

/// Read operator questions until `exit`, EOF or Ctrl-C.
async fn repl(core: &Arc<AgentCore>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            return Ok(());
        }

        let answer = tokio::select! {
            answer = core.handle_user_input(question) => answer,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        println!("\n{}\n", answer);
    }
}

async fn print_report(findings: FindingsTracker, history: bool, format: OutputFormat) -> Result<()> {
    let selected = if history {
        findings.get_history(None, true, REPORT_HISTORY_LIMIT).await?
    } else {
        findings.get_active(None, None, None)
    };

    let report = FindingsReport::new(selected, history);
    let output = match format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };
    println!("{}", output);
    Ok(())
}
