//! Configuration file handling.
//!
//! This module loads `netwarden.toml`, expands `${VAR}` references from the
//! environment and merges CLI overrides on top.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// LLM backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Tool loop and conversation limits.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Check interval per category, in seconds.
    #[serde(default = "default_schedule")]
    pub schedule: BTreeMap<String, u64>,

    /// Per-device overrides of `schedule`.
    #[serde(default)]
    pub device_schedules: HashMap<String, BTreeMap<String, u64>>,

    /// Metric storage, anomaly detection and extraction rules.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Cross-category anomaly correlation.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Periodic checklist evaluation.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Persistent markdown memory.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Managed devices.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Commands run for each check category.
    #[serde(default = "default_checks")]
    pub checks: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            schedule: default_schedule(),
            device_schedules: HashMap::new(),
            metrics: MetricsConfig::default(),
            correlation: CorrelationConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            memory: MemoryConfig::default(),
            devices: Vec::new(),
            checks: default_checks(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding databases, memory and the heartbeat file.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
        }
    }
}

impl GeneralConfig {
    /// Storage directory with a leading `~` expanded.
    pub fn storage_dir(&self) -> PathBuf {
        expand_home(&self.storage_path)
    }
}

fn default_storage_path() -> String {
    "~/.netwarden".to_string()
}

/// LLM backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend provider. Only `ollama` is supported.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ollama API URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Replaces the built-in system prompt when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            system_prompt: None,
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    300
}

/// Tool loop and conversation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on LLM calls per tool loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Interactive context size that triggers compaction at 80%.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_context_messages: default_max_context_messages(),
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_context_messages() -> usize {
    50
}

fn default_schedule() -> BTreeMap<String, u64> {
    [
        ("chassis", 300),
        ("interfaces", 120),
        ("routing", 180),
        ("system", 300),
        ("config", 86400),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Metric storage and anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_z_threshold")]
    pub anomaly_z_threshold: f64,

    /// Baseline window in hours.
    #[serde(default = "default_window_hours")]
    pub anomaly_window_hours: u32,

    /// Samples required before anything is flagged.
    #[serde(default = "default_min_samples")]
    pub anomaly_min_samples: usize,

    /// Regex rules turning command output into metrics.
    #[serde(default = "default_metric_rules")]
    pub rules: Vec<MetricRule>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            anomaly_z_threshold: default_z_threshold(),
            anomaly_window_hours: default_window_hours(),
            anomaly_min_samples: default_min_samples(),
            rules: default_metric_rules(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_window_hours() -> u32 {
    24
}

fn default_min_samples() -> usize {
    10
}

/// One extraction rule. `pattern` needs a `value` group (or group 1)
/// unless `aggregate` is `count`; with `first`, a `name` group fans the
/// rule out into one metric per match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub category: String,
    pub command: String,
    pub pattern: String,
    pub metric: String,
    #[serde(default)]
    pub unit: String,
    /// Monotonic counter; a `<metric>_delta` point is derived per cycle.
    #[serde(default)]
    pub counter: bool,
    #[serde(default)]
    pub aggregate: Aggregate,
}

impl MetricRule {
    pub fn new(category: &str, command: &str, pattern: &str, metric: &str, unit: &str) -> Self {
        Self {
            category: category.to_string(),
            command: command.to_string(),
            pattern: pattern.to_string(),
            metric: metric.to_string(),
            unit: unit.to_string(),
            counter: false,
            aggregate: Aggregate::First,
        }
    }

    pub fn counter(mut self) -> Self {
        self.counter = true;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }
}

/// How the matches of a rule's pattern become a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Value of the first match, or one metric per `name` match.
    #[default]
    First,
    /// Number of matches; reported whenever the command produced output.
    Count,
    /// Sum of all captured values.
    Sum,
    /// Largest captured value.
    Max,
}

const IPV4_LINE: &str = r"(?m)^[ \t]*\d+\.\d+\.\d+\.\d+[ \t]";

fn default_metric_rules() -> Vec<MetricRule> {
    let bgp_established = format!(r"{}.*[ \t](?:\d+(?:/\d+)+|\d+)[ \t]*$", IPV4_LINE);
    vec![
        // chassis
        MetricRule::new(
            "chassis",
            "show chassis routing-engine",
            r"CPU\s+utilization[:\s]+(\d+)\s*percent",
            "re_cpu_pct",
            "%",
        ),
        MetricRule::new(
            "chassis",
            "show chassis routing-engine",
            r"Memory\s+utilization[:\s]+(\d+)\s*percent",
            "re_memory_pct",
            "%",
        ),
        MetricRule::new(
            "chassis",
            "show pfe statistics exceptions",
            r"(?m)^\s*(?P<name>\S[\w\s-]+?):\s+(?P<value>\d+)",
            "pfe_exception",
            "",
        )
        .counter(),
        // interfaces: physical ports only, sub-interfaces carry a unit suffix
        MetricRule::new(
            "interfaces",
            "show interfaces terse",
            r"(?im)^[^\s.]+[ \t]+up[ \t]+up\b",
            "iface_up_count",
            "interfaces",
        )
        .aggregate(Aggregate::Count),
        MetricRule::new(
            "interfaces",
            "show interfaces terse",
            r"(?im)^[^\s.]+[ \t]+up[ \t]+down\b",
            "iface_down_count",
            "interfaces",
        )
        .aggregate(Aggregate::Count),
        MetricRule::new(
            "interfaces",
            "show interfaces statistics",
            r"(?i)(?:Input|Output)\s+errors:\s+(\d+)",
            "iface_error_count",
            "errors",
        )
        .counter()
        .aggregate(Aggregate::Sum),
        // routing
        MetricRule::new(
            "routing",
            "show route summary",
            r"\d+\s+destinations,\s+(\d+)\s+routes",
            "route_total",
            "routes",
        ),
        MetricRule::new(
            "routing",
            "show route summary",
            r"\d+\s+routes\s+\((\d+)\s+active",
            "route_active",
            "routes",
        ),
        MetricRule::new("routing", "show bgp summary", IPV4_LINE, "bgp_peer_count", "peers")
            .aggregate(Aggregate::Count),
        MetricRule::new(
            "routing",
            "show bgp summary",
            &bgp_established,
            "bgp_established_count",
            "peers",
        )
        .aggregate(Aggregate::Count),
        MetricRule::new("routing", "show ospf neighbor", IPV4_LINE, "ospf_neighbor_count", "neighbors")
            .aggregate(Aggregate::Count),
        // system
        MetricRule::new("system", "show system storage", r"(\d+)%\s+/\S*", "disk_used_pct", "%")
            .aggregate(Aggregate::Max),
        MetricRule::new(
            "system",
            "show chassis routing-engine",
            r"(?is)Load\s+averages?.*?(\d+\.\d+)",
            "re_load_avg",
            "load",
        ),
    ]
}

/// Cross-category anomaly correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a device's batch is investigated.
    #[serde(default = "default_correlation_window")]
    pub window_seconds: f64,

    /// Operator-requested checks skip the batching window.
    #[serde(default = "default_true")]
    pub bypass_on_user_trigger: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: default_correlation_window(),
            bypass_on_user_trigger: true,
        }
    }
}

fn default_correlation_window() -> f64 {
    30.0
}

/// Periodic checklist evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between heartbeat cycles.
    #[serde(default = "default_heartbeat_interval")]
    pub interval: u64,

    /// Checklist file, relative to the storage path.
    #[serde(default = "default_heartbeat_file")]
    pub file: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_heartbeat_interval(),
            file: default_heartbeat_file(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    1800
}

fn default_heartbeat_file() -> String {
    "heartbeat.md".to_string()
}

/// Persistent markdown memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-file cap in bytes; older lines are dropped past it.
    #[serde(default = "default_memory_file_size")]
    pub max_file_size: usize,

    /// Cap on the memory block injected into the system prompt.
    #[serde(default = "default_memory_total_size")]
    pub max_total_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_file_size: default_memory_file_size(),
            max_total_size: default_memory_total_size(),
        }
    }
}

fn default_memory_file_size() -> usize {
    8000
}

fn default_memory_total_size() -> usize {
    24000
}

/// A managed device and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-command timeout in seconds.
    #[serde(default = "default_device_timeout")]
    pub timeout: u64,
    /// Argv template; `{name}`, `{host}`, `{port}`, `{username}` and
    /// `{command}` are substituted.
    #[serde(default = "default_exec")]
    pub exec: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            username: String::new(),
            port: default_port(),
            timeout: default_device_timeout(),
            exec: default_exec(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_device_timeout() -> u64 {
    60
}

fn default_exec() -> Vec<String> {
    ["ssh", "-p", "{port}", "{username}@{host}", "{command}"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_checks() -> BTreeMap<String, Vec<String>> {
    let checks: [(&str, &[&str]); 5] = [
        (
            "chassis",
            &[
                "show chassis alarms",
                "show system alarms",
                "show chassis environment",
                "show chassis routing-engine",
                "show chassis fpc",
                "show pfe statistics exceptions",
            ],
        ),
        ("interfaces", &["show interfaces terse", "show interfaces statistics"]),
        (
            "routing",
            &[
                "show bgp summary",
                "show ospf neighbor",
                "show isis adjacency",
                "show route summary",
            ],
        ),
        (
            "system",
            &[
                "show chassis routing-engine",
                "show system storage",
                "show system processes extensive",
            ],
        ),
        ("config", &["show configuration | display set", "show configuration"]),
    ];
    checks
        .into_iter()
        .map(|(category, commands)| {
            (
                category.to_string(),
                commands.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

fn default_true() -> bool {
    true
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Replace `${VAR}` with the environment value; unknown names stay verbatim.
pub fn expand_env(content: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env pattern"));
    pattern
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse TOML text after environment expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(&expand_env(content))?;
        Ok(config)
    }

    /// Try `./netwarden.toml`, then `~/.netwarden/config.toml`.
    ///
    /// Returns `Ok(None)` if neither exists, `Err` if one exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        for candidate in Self::default_paths() {
            if candidate.exists() {
                return Ok(Some(Self::load(&candidate)?));
            }
        }
        Ok(None)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("netwarden.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".netwarden").join("config.toml"));
        }
        paths
    }

    /// Resolve the configuration for a run: explicit path, default locations, or built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_default()?.unwrap_or_default()),
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.llm.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.llm.base_url = url.clone();
        }
    }

    /// Absolute path of the heartbeat checklist.
    pub fn heartbeat_path(&self) -> PathBuf {
        let file = expand_home(&self.heartbeat.file);
        if file.is_absolute() {
            file
        } else {
            self.general.storage_dir().join(file)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ExtractorSet, MetricExtractor};
    use crate::models::{CheckResult, CheckResults};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.max_context_messages, 50);
        assert!(config.correlation.enabled);
        assert!(config.correlation.bypass_on_user_trigger);
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.memory.max_file_size, 8000);
        assert_eq!(config.metrics.anomaly_min_samples, 10);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_default_schedule_and_checks() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.schedule, Config::default().schedule);
        assert_eq!(config.schedule.get("interfaces"), Some(&120));
        assert_eq!(config.schedule.get("config"), Some(&86400));
        assert_eq!(config.checks.len(), 5);
        assert!(config.checks["routing"].contains(&"show bgp summary".to_string()));
        assert_eq!(config.metrics.rules.len(), 13);
        assert!(config.metrics.rules.iter().any(|r| r.counter));
    }

    #[test]
    fn test_only_config_category_lacks_default_extractor() {
        let config = Config::default();
        let extractors = ExtractorSet::from_rules(&config.metrics.rules).unwrap();
        let without: Vec<&str> = config
            .schedule
            .keys()
            .filter(|category| !extractors.has(category))
            .map(String::as_str)
            .collect();
        assert_eq!(without, vec!["config"]);
    }

    #[test]
    fn test_default_rules_read_typical_output() {
        let config = Config::default();
        let extractors = ExtractorSet::from_rules(&config.metrics.rules).unwrap();
        let results = |pairs: &[(&str, &str)]| -> CheckResults {
            pairs
                .iter()
                .map(|(cmd, out)| (cmd.to_string(), CheckResult::ok(*cmd, *out)))
                .collect()
        };
        let values = |category: &str, results: &CheckResults| -> BTreeMap<String, f64> {
            extractors
                .get(category)
                .unwrap()
                .extract(results)
                .unwrap()
                .into_iter()
                .map(|m| (m.metric, m.value))
                .collect()
        };

        let terse = "Interface               Admin Link Proto    Local                 Remote\n\
                     ge-0/0/0                up    up\n\
                     ge-0/0/0.0              up    up   inet     10.0.0.1/30\n\
                     ge-0/0/1                up    down\n\
                     ge-0/0/2                up    up\n";
        let stats = "Physical interface: ge-0/0/0\n  Input errors: 3\n  Output errors: 4\n\
                     Physical interface: ge-0/0/1\n  Input errors: 0\n  Output errors: 5\n";
        let interfaces = values(
            "interfaces",
            &results(&[("show interfaces terse", terse), ("show interfaces statistics", stats)]),
        );
        assert_eq!(interfaces["iface_up_count"], 2.0);
        assert_eq!(interfaces["iface_down_count"], 1.0);
        assert_eq!(interfaces["iface_error_count"], 12.0);

        let route = "inet.0: 812 destinations, 1630 routes (812 active, 0 holddown, 0 hidden)\n";
        let bgp = "Peer                     AS      InPkt     OutPkt    OutQ   Flaps Last Up/Dwn State|#Active/Received/Accepted/Damped...\n\
                   10.0.0.2              65002       1234       1240       0       0     1w2d 4/8/8/0\n\
                   10.0.0.3              65003          0          0       0       2        5:01 Idle\n";
        let ospf = "Address          Interface              State     ID               Pri  Dead\n\
                    10.1.1.2         ge-0/0/0.0             Full      192.0.2.2        128    36\n";
        let routing = values(
            "routing",
            &results(&[
                ("show route summary", route),
                ("show bgp summary", bgp),
                ("show ospf neighbor", ospf),
            ]),
        );
        assert_eq!(routing["route_total"], 1630.0);
        assert_eq!(routing["route_active"], 812.0);
        assert_eq!(routing["bgp_peer_count"], 2.0);
        assert_eq!(routing["bgp_established_count"], 1.0);
        assert_eq!(routing["ospf_neighbor_count"], 1.0);

        let storage = "Filesystem   Size  Used  Avail  Capacity  Mounted on\n\
                       /dev/gpt/junos  20G  9.1G  9.3G  49%  /.mount\n\
                       tmpfs  1.2G  1.1G  0.1G  91%  /.mount/tmp\n";
        let engine = "Load averages:   1 minute   5 minute  15 minute\n                  0.25       0.18      0.15\n";
        let system = values(
            "system",
            &results(&[("show system storage", storage), ("show chassis routing-engine", engine)]),
        );
        assert_eq!(system["disk_used_pct"], 91.0);
        assert_eq!(system["re_load_avg"], 0.25);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
storage_path = "/var/lib/netwarden"

[llm]
model = "qwen2.5:14b"
temperature = 0.2

[schedule]
chassis = 60

[device_schedules.edge1]
interfaces = 30

[correlation]
enabled = false

[[devices]]
name = "edge1"
host = "192.0.2.1"
username = "ops"

[[metrics.rules]]
category = "interfaces"
command = "show interfaces statistics"
pattern = 'Input errors:\s+(\d+)'
metric = "input_errors"
counter = true
"#;

        let config = Config::parse(toml_content).unwrap();
        assert_eq!(config.general.storage_dir(), PathBuf::from("/var/lib/netwarden"));
        assert_eq!(config.llm.model, "qwen2.5:14b");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.schedule, BTreeMap::from([("chassis".to_string(), 60)]));
        assert_eq!(config.device_schedules["edge1"]["interfaces"], 30);
        assert!(!config.correlation.enabled);
        assert_eq!(config.devices[0].port, 22);
        assert_eq!(config.devices[0].exec[0], "ssh");
        assert_eq!(config.metrics.rules.len(), 1);
        assert!(config.metrics.rules[0].counter);
        assert_eq!(config.metrics.rules[0].unit, "");
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("NETWARDEN_TEST_HOST", "198.51.100.7");
        let expanded = expand_env("host = \"${NETWARDEN_TEST_HOST}\"\nuser = \"${NETWARDEN_TEST_UNSET_VAR}\"");
        assert!(expanded.contains("198.51.100.7"));
        assert!(expanded.contains("${NETWARDEN_TEST_UNSET_VAR}"));
    }

    #[test]
    fn test_heartbeat_path_relative_to_storage() {
        let mut config = Config::default();
        config.general.storage_path = "/srv/nw".to_string();
        assert_eq!(config.heartbeat_path(), PathBuf::from("/srv/nw/heartbeat.md"));
        config.heartbeat.file = "/etc/nw/hb.md".to_string();
        assert_eq!(config.heartbeat_path(), PathBuf::from("/etc/nw/hb.md"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[correlation]"));
        let reparsed = Config::parse(&toml_str).unwrap();
        assert_eq!(reparsed.schedule, default_schedule());
    }
}
