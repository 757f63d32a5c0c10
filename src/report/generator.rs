//! Markdown and JSON findings reports.
//!
//! A report is a snapshot of the findings tracker: the active set, or the
//! stored history when resolved findings are requested.

use crate::models::{Finding, FindingsSummary, Severity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot of findings for printing.
#[derive(Debug, Clone, Serialize)]
pub struct FindingsReport {
    pub generated_at: DateTime<Utc>,
    pub include_resolved: bool,
    pub summary: FindingsSummary,
    pub findings: Vec<Finding>,
}

impl FindingsReport {
    pub fn new(findings: Vec<Finding>, include_resolved: bool) -> Self {
        Self {
            generated_at: Utc::now(),
            include_resolved,
            summary: FindingsSummary::from_findings(&findings),
            findings,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &FindingsReport) -> String {
    let mut output = String::new();

    output.push_str("# NetWarden Findings Report\n\n");
    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_findings_section(&report.findings));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(report: &FindingsReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let scope = if report.include_resolved {
        "active and resolved findings"
    } else {
        "active findings"
    };
    section.push_str(&format!("- **Scope:** {}\n", scope));
    section.push_str(&format!("- **Devices:** {}\n", report.summary.by_device.len()));
    section.push_str(&format!("- **Total Findings:** {}\n\n", report.summary.total));

    section
}

fn generate_summary_section(summary: &FindingsSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| {} Critical | {} Warning | {} Info | ✅ Resolved | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::Warning.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.warning, summary.info, summary.resolved, summary.total
    ));

    if !summary.by_category.is_empty() {
        section.push_str("### Findings by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    section
}

fn generate_findings_section(findings: &[Finding]) -> String {
    let mut section = String::new();

    section.push_str("## Findings by Device\n\n");

    if findings.is_empty() {
        section.push_str("No findings. All monitored devices look healthy.\n\n");
        return section;
    }

    let mut by_device: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        by_device.entry(finding.device.as_str()).or_default().push(finding);
    }

    for (device, mut device_findings) in by_device {
        let heading = if device == "*" { "Fleet-wide" } else { device };
        section.push_str(&format!("### {}\n\n", heading));

        device_findings.sort_by(|a, b| {
            a.resolved
                .cmp(&b.resolved)
                .then(a.severity.cmp(&b.severity))
                .then(b.last_seen.cmp(&a.last_seen))
        });
        for finding in device_findings {
            section.push_str(&generate_finding_block(finding));
        }
    }

    section
}

fn generate_finding_block(finding: &Finding) -> String {
    let mut block = String::new();

    let badge = format!(
        "{} **{}**",
        finding.severity.emoji(),
        finding.severity.as_str().to_uppercase()
    );
    let status = if finding.resolved { " (resolved)" } else { "" };
    block.push_str(&format!(
        "#### {} {} - {}{}\n\n",
        badge, finding.category, finding.title, status
    ));

    block.push_str(&format!(
        "*First seen: {} | Last seen: {}*\n\n",
        finding.first_seen.format("%Y-%m-%d %H:%M"),
        finding.last_seen.format("%Y-%m-%d %H:%M")
    ));

    if !finding.detail.is_empty() {
        block.push_str(&format!("**Detail:** {}\n\n", finding.detail));
    }
    if !finding.recommendation.is_empty() {
        block.push_str(&format!("> 💡 **Recommendation:** {}\n\n", finding.recommendation));
    }

    block.push_str("---\n\n");

    block
}

fn generate_footer() -> String {
    "*Report generated by NetWarden*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &FindingsReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
