//! Prompt templates.
//!
//! Placeholders are `{name}` and are filled by the builder functions below.

pub const SYSTEM_PROMPT: &str = r#"You are a senior network engineer operating as an autonomous monitoring agent for a fleet of routers. You watch device health, investigate problems and audit configurations.

You act, you do not advise. When something looks wrong, use your tools to investigate it yourself: run the commands, pull the configuration, look at metric history, then report a concrete diagnosis. Never ask the operator to run a command you could run.

When analysing device output:
- Look for errors, anomalies and deviations from best practice
- Run additional commands to confirm a suspicion before reporting it
- Rate impact as critical (service-affecting), warning (potential issue) or info (notable but benign)

When answering the operator:
- Gather data with your tools before answering
- Say which commands you ran and why
- Be concise

You have persistent memory across sessions. Use save_memory for device quirks, baselines, operator preferences and incident patterns, and read_memory to recall them. Memory categories are 'device', 'user' and 'incident'."#;

const FINDING_FIELDS: &str = r#"- severity: "critical", "warning" or "info"
- title: one-line summary
- detail: root cause analysis with evidence from the commands you ran
- recommendation: what you did to diagnose, and what only the operator can still do (for example a hardware replacement)"#;

const INVESTIGATION_STEPS: &str = r#"Investigate on the device itself; do not just restate the anomaly and suggest checks:
1. Use run_command for correlated counters and logs (for example "show log messages").
2. Use get_config to see whether a recent change explains the shift.
3. Use get_metrics for the history of the affected metrics."#;

const ANALYSIS_TEMPLATE: &str = r#"Analyse the following health check data from device '{device}' (category: {category}).

Start with read_memory to recall known baselines, earlier incidents or operator preferences for this device.

If something looks wrong, investigate before reporting it: run related commands, check the configuration and pull metric history to confirm the root cause.

Respond with a JSON array with one object per confirmed issue:
{fields}

If there are no issues, respond with an empty array: []

Afterwards, save any noteworthy pattern you discovered with save_memory.

Raw data:
{data}"#;

const ANOMALY_TEMPLATE: &str = r#"Statistical anomalies detected on device '{device}' ({category} check).

Start with read_memory to recall baselines, earlier incidents or device notes that could explain them.

Detected anomalies:
{anomalies}

Raw command output:
{data}
{context}First decide whether the anomalies are already explained as benign, such as a maintenance window, a counter reset or normal daily variance. If so, respond with an empty JSON array: []

{steps}

Then respond with a JSON array of findings:
{fields}

Afterwards, save new baselines or root cause information with save_memory."#;

const CORRELATED_TEMPLATE: &str = r#"Anomalies in several categories fired together on device '{device}' (categories: {categories}).

Start with read_memory to recall baselines, earlier incidents or device notes that could explain them.

{blocks}
{context}These anomalies appeared within a short window and may share one root cause. Look for a single underlying problem before treating them as independent.

{steps}

Then respond with a JSON array of findings. Every finding must carry a "category" field naming the check category it belongs to (one of: {categories}):
- category: the check category of the finding
{fields}

If every anomaly is benign, respond with an empty JSON array: []

Afterwards, save new baselines or root cause information with save_memory."#;

const HEARTBEAT_TEMPLATE: &str = r#"This is a scheduled heartbeat check. Evaluate each instruction below with your tools, across all connected devices as appropriate.

Prefer data that was already collected: use get_findings and get_metrics before running new commands, and only use run_command or get_config when existing data cannot answer an instruction.

Investigate any potential issue fully before reporting it.

If everything is normal, respond with an empty JSON array: []
Otherwise respond with a JSON array of findings:
{fields}

Heartbeat instructions:
{instructions}"#;

pub const MEMORY_FLUSH_PROMPT: &str = r#"Review the conversation above and persist anything important with save_memory:
- device quirks, baselines or patterns learned while troubleshooting
- operator preferences such as thresholds, output formats or habits
- incidents with their root cause and resolution

Only save observations that will be useful later. If nothing qualifies, do nothing."#;

pub const SUMMARIZE_PROMPT: &str = r#"Summarise the conversation above in one compact paragraph covering the devices discussed and their state, issues found or resolved, pending actions and key decisions. This summary replaces the older messages."#;

/// Prompt for a category without an extractor.
pub fn analysis(device: &str, category: &str, data: &str) -> String {
    ANALYSIS_TEMPLATE
        .replace("{fields}", FINDING_FIELDS)
        .replace("{device}", device)
        .replace("{category}", category)
        .replace("{data}", data)
}

/// Prompt for a single category with flagged metrics.
pub fn anomaly(device: &str, category: &str, anomalies: &str, data: &str, context: &str) -> String {
    ANOMALY_TEMPLATE
        .replace("{steps}", INVESTIGATION_STEPS)
        .replace("{fields}", FINDING_FIELDS)
        .replace("{device}", device)
        .replace("{category}", category)
        .replace("{anomalies}", anomalies)
        .replace("{context}", context)
        .replace("{data}", data)
}

/// Prompt covering every category of a flushed batch.
pub fn correlated(device: &str, categories: &[String], blocks: &str, context: &str) -> String {
    CORRELATED_TEMPLATE
        .replace("{steps}", INVESTIGATION_STEPS)
        .replace("{fields}", FINDING_FIELDS)
        .replace("{device}", device)
        .replace("{categories}", &categories.join(", "))
        .replace("{context}", context)
        .replace("{blocks}", blocks)
}

pub fn heartbeat(instructions: &str) -> String {
    HEARTBEAT_TEMPLATE
        .replace("{fields}", FINDING_FIELDS)
        .replace("{instructions}", instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_prompt_mentions_anomaly_and_device() {
        let prompt = anomaly("r1", "chassis", "ANOMALY: cpu_temp = 95", "--- show chassis environment ---", "");
        assert!(prompt.contains("anomal"));
        assert!(prompt.contains("device 'r1' (chassis check)"));
        assert!(prompt.contains("ANOMALY: cpu_temp = 95"));
        assert!(!prompt.contains("{"), "unfilled placeholder in: {}", prompt);
    }

    #[test]
    fn test_correlated_prompt_requires_category_field() {
        let categories = vec!["chassis".to_string(), "interfaces".to_string()];
        let prompt = correlated("r1", &categories, "=== chassis ===", "");
        assert!(prompt.contains("\"category\" field"));
        assert!(prompt.contains("(one of: chassis, interfaces)"));
        assert!(prompt.contains("=== chassis ==="));
    }

    #[test]
    fn test_analysis_and_heartbeat_are_filled() {
        let prompt = analysis("r2", "config", "set system host-name r2");
        assert!(prompt.ends_with("set system host-name r2"));
        assert!(prompt.contains("[]"));

        let prompt = heartbeat("- Verify NTP sync");
        assert!(prompt.ends_with("- Verify NTP sync"));
        assert!(!prompt.contains("{fields}"));
    }
}
