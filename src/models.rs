//! Data models for the monitoring agent.
//!
//! This module contains the core data structures shared across the
//! engine: findings and their severity, check results, metric samples
//! and anomaly results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Severity level of a finding.
///
/// Variants are declared most severe first, so the derived ordering
/// sorts critical findings ahead of warnings and info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Service-affecting problem
    Critical,
    /// Potential issue that needs attention
    Warning,
    /// Notable but benign
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

impl Severity {
    /// Lowercase wire name, as stored and as returned by the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Parse a severity reported by the model. Unknown values map to `Info`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Severity::Info)
    }

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::Warning => "🟠",
            Severity::Info => "🔵",
        }
    }
}

/// A deduplicated, persisted diagnosis of an issue on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Deterministic id derived from `(device, category, title)`.
    pub id: String,
    pub device: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub detail: String,
    pub recommendation: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

/// Outcome of a single command executed against a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub command: String,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured payload when the driver produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn ok(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: true,
            output: output.into(),
            error: None,
            structured: None,
        }
    }

    pub fn failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            structured: None,
        }
    }
}

/// Per-command results of one check category run, keyed by command text.
pub type CheckResults = BTreeMap<String, CheckResult>;

/// A metric value pulled out of raw command output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedMetric {
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub tags: HashMap<String, String>,
    /// Monotonically increasing counter; a `<metric>_delta` point is derived.
    pub is_counter: bool,
}

impl ExtractedMetric {
    pub fn new(metric: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value,
            unit: unit.into(),
            tags: HashMap::new(),
            is_counter: false,
        }
    }

    pub fn counter(mut self) -> Self {
        self.is_counter = true;
        self
    }
}

/// A stored time-series sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub device: String,
    pub category: String,
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    /// Sample time; filled in by the store when absent.
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl MetricPoint {
    pub fn new(device: &str, category: &str, metric: &str, value: f64, unit: &str) -> Self {
        Self {
            device: device.to_string(),
            category: category.to_string(),
            metric: metric.to_string(),
            value,
            unit: unit.to_string(),
            ts: None,
            tags: HashMap::new(),
        }
    }
}

/// A metric sample flagged as deviating from its historical baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub metric: String,
    pub value: f64,
    pub mean: f64,
    pub stddev: f64,
    pub z_score: f64,
    pub unit: String,
}

impl AnomalyResult {
    /// One-line rendering used inside investigation prompts.
    pub fn to_context_line(&self) -> String {
        format!(
            "ANOMALY: {} = {}{} (mean={:.2}, stddev={:.2}, z-score={:.2})",
            self.metric, self.value, self.unit, self.mean, self.stddev, self.z_score
        )
    }
}

/// Summary of findings for reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    /// Resolved findings included in the summarised set.
    pub resolved: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_device: BTreeMap<String, usize>,
}

impl FindingsSummary {
    /// Creates a summary from a list of findings.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            ..Self::default()
        };

        for finding in findings {
            if finding.resolved {
                summary.resolved += 1;
            } else {
                match finding.severity {
                    Severity::Critical => summary.critical += 1,
                    Severity::Warning => summary.warning += 1,
                    Severity::Info => summary.info += 1,
                }
            }

            *summary
                .by_category
                .entry(finding.category.clone())
                .or_insert(0) += 1;
            *summary.by_device.entry(finding.device.clone()).or_insert(0) += 1;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(device: &str, severity: Severity, category: &str, resolved: bool) -> Finding {
        Finding {
            id: "id".to_string(),
            device: device.to_string(),
            severity,
            category: category.to_string(),
            title: "t".to_string(),
            detail: String::new(),
            recommendation: String::new(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved,
            raw_data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::Warning);
        assert!(Severity::Warning < Severity::Info);
    }

    #[test]
    fn test_severity_parse_lenient() {
        assert_eq!(Severity::parse_lenient("critical"), Severity::Critical);
        assert_eq!(Severity::parse_lenient("WARNING"), Severity::Warning);
        assert_eq!(Severity::parse_lenient("high"), Severity::Info);
        assert_eq!(Severity::parse_lenient(""), Severity::Info);
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn test_anomaly_context_line() {
        let anomaly = AnomalyResult {
            metric: "cpu_temp".to_string(),
            value: 95.0,
            mean: 60.0,
            stddev: 5.0,
            z_score: 7.0,
            unit: "C".to_string(),
        };
        let line = anomaly.to_context_line();
        assert!(line.starts_with("ANOMALY: cpu_temp = 95C"));
        assert!(line.contains("z-score=7.00"));
    }

    #[test]
    fn test_findings_summary() {
        let findings = vec![
            finding("r1", Severity::Critical, "chassis", false),
            finding("r1", Severity::Warning, "interfaces", false),
            finding("r2", Severity::Info, "chassis", true),
        ];

        let summary = FindingsSummary::from_findings(&findings);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.info, 0);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.by_category.get("chassis"), Some(&2));
        assert_eq!(summary.by_device.get("r1"), Some(&2));
    }
}
