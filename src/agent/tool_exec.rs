//! Tool execution for the LLM tool loop.
//!
//! Every tool returns a string. Failures are folded into the string as
//! `Tool error: ...` so the model can see them and adapt.

use super::core::AgentCore;
use crate::device::ConfigFormat;
use crate::llm::ToolCall;
use crate::models::Severity;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::warn;

const HISTORY_LIMIT: usize = 100;
const DEFAULT_METRIC_HOURS: u32 = 24;

fn required<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required argument '{}'", name))
}

fn optional<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Integer argument; models sometimes send numbers as strings.
fn integer(args: &Value, name: &str) -> Option<u64> {
    match args.get(name)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn boolean(args: &Value, name: &str) -> bool {
    match args.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl AgentCore {
    /// Execute one tool call. Boxed because `run_health_check` re-enters the check pipeline.
    pub(crate) fn execute_tool<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, String> {
        async move {
            match self.dispatch_tool(&call.name, &call.arguments).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Tool execution error ({}): {:#}", call.name, e);
                    format!("Tool error: {:#}", e)
                }
            }
        }
        .boxed()
    }

    async fn dispatch_tool(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "run_command" => {
                let result = self
                    .devices
                    .run_command(required(args, "device")?, required(args, "command")?)
                    .await;
                if !result.success {
                    return Ok(format!("Error: {}", result.error.unwrap_or_default()));
                }
                if result.output.is_empty() {
                    return Ok("(no output)".to_string());
                }
                Ok(result.output)
            }

            "get_config" => {
                let device = required(args, "device")?;
                let format = optional(args, "format")
                    .map(str::parse::<ConfigFormat>)
                    .transpose()
                    .map_err(|e| anyhow!(e))?
                    .unwrap_or_default();
                self.devices.get_config(device, optional(args, "section"), format).await
            }

            "get_device_facts" => {
                let facts = self.devices.get_facts(required(args, "device")?).await?;
                Ok(serde_json::to_string_pretty(&facts)?)
            }

            "list_devices" => Ok(serde_json::to_string_pretty(&self.devices.list_devices())?),

            "get_findings" => {
                let device = optional(args, "device");
                let severity = optional(args, "severity").and_then(|s| s.parse::<Severity>().ok());
                let category = optional(args, "category");

                let findings = if boolean(args, "include_resolved") {
                    let history = self.findings.lock().await.get_history(device, true, HISTORY_LIMIT).await?;
                    history
                        .into_iter()
                        .filter(|f| severity.map_or(true, |s| f.severity == s))
                        .filter(|f| category.map_or(true, |c| f.category == c))
                        .collect()
                } else {
                    self.findings.lock().await.get_active(device, severity, category)
                };
                Ok(serde_json::to_string_pretty(&findings)?)
            }

            "run_health_check" => {
                let device = required(args, "device")?;
                let category = required(args, "category")?;
                self.run_check(category, device, true).await?;

                let findings = self.findings.lock().await.get_active(Some(device), None, Some(category));
                if findings.is_empty() {
                    return Ok("Health check completed. No issues found.".to_string());
                }
                Ok(serde_json::to_string_pretty(&findings)?)
            }

            "get_metrics" => {
                let Some(store) = &self.metrics else {
                    return Ok("Metrics store not configured.".to_string());
                };
                let device = required(args, "device")?;

                let Some(metric) = optional(args, "metric") else {
                    let names = store.list_metrics(device).await?;
                    if names.is_empty() {
                        return Ok("No metrics recorded for this device yet.".to_string());
                    }
                    return Ok(serde_json::to_string_pretty(&names)?);
                };

                let hours = integer(args, "since_hours")
                    .map(|h| u32::try_from(h).unwrap_or(u32::MAX))
                    .unwrap_or(DEFAULT_METRIC_HOURS);
                let points = store.query(device, metric, hours).await?;
                if points.is_empty() {
                    return Ok(format!("No data for metric '{}' in the last {}h.", metric, hours));
                }
                Ok(serde_json::to_string_pretty(&points)?)
            }

            "manage_heartbeat" => {
                let Some(manager) = &self.heartbeat else {
                    return Ok("Heartbeat not configured.".to_string());
                };
                match required(args, "action")? {
                    "list" => Ok(manager.list_instructions()),
                    "add" => manager.add_instruction(required(args, "instruction")?),
                    "remove" => {
                        let index = integer(args, "index")
                            .ok_or_else(|| anyhow!("missing required argument 'index'"))?;
                        manager.remove_instruction(usize::try_from(index).unwrap_or(usize::MAX))
                    }
                    "replace" => manager.replace_instructions(required(args, "instruction")?),
                    other => Ok(format!("Unknown heartbeat action: {}", other)),
                }
            }

            "save_memory" => {
                let Some(memory) = &self.memory else {
                    return Ok("Memory store not configured.".to_string());
                };
                memory.save(
                    required(args, "category")?,
                    optional(args, "key"),
                    required(args, "content")?,
                )
            }

            "read_memory" => {
                let Some(memory) = &self.memory else {
                    return Ok("Memory store not configured.".to_string());
                };
                memory.read(required(args, "category")?, optional(args, "key"))
            }

            other => Ok(format!("Unknown tool: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::findings::FindingsTracker;
    use crate::agent::heartbeat::HeartbeatManager;
    use crate::agent::memory::MarkdownMemory;
    use crate::testing::{FakeDevices, ScriptedLlm, StaticChecks};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn core_with(devices: FakeDevices) -> Arc<AgentCore> {
        AgentCore::builder(
            Arc::new(ScriptedLlm::new()),
            Arc::new(devices),
            Arc::new(StaticChecks::new()),
            FindingsTracker::open_in_memory().unwrap(),
        )
        .build()
    }

    async fn call(core: &AgentCore, name: &str, args: Value) -> String {
        core.execute_tool(&ToolCall::new("call_1", name, args)).await
    }

    #[test]
    fn test_argument_helpers() {
        let args = json!({"index": "3", "n": 2, "flag": "TRUE", "blank": "  "});
        assert_eq!(integer(&args, "index"), Some(3));
        assert_eq!(integer(&args, "n"), Some(2));
        assert!(boolean(&args, "flag"));
        assert!(!boolean(&args, "missing"));
        assert_eq!(optional(&args, "blank"), None);
        assert!(required(&args, "device").is_err());
    }

    #[tokio::test]
    async fn test_run_command() {
        let core = core_with(
            FakeDevices::new(&["r1"])
                .with_output("show version", "Junos: 23.4R1")
                .with_output("show log empty", "")
                .with_failure("show bogus", "syntax error"),
        );
        assert_eq!(
            call(&core, "run_command", json!({"device": "r1", "command": "show version"})).await,
            "Junos: 23.4R1"
        );
        assert_eq!(
            call(&core, "run_command", json!({"device": "r1", "command": "show log empty"})).await,
            "(no output)"
        );
        assert_eq!(
            call(&core, "run_command", json!({"device": "r1", "command": "show bogus"})).await,
            "Error: syntax error"
        );
    }

    #[tokio::test]
    async fn test_missing_argument_and_unknown_tool() {
        let core = core_with(FakeDevices::new(&["r1"]));
        assert_eq!(
            call(&core, "run_command", json!({"device": "r1"})).await,
            "Tool error: missing required argument 'command'"
        );
        assert_eq!(call(&core, "reboot_everything", json!({})).await, "Unknown tool: reboot_everything");
    }

    #[tokio::test]
    async fn test_get_config_rejects_unknown_format() {
        let core = core_with(FakeDevices::new(&["r1"]).with_output("show configuration | display set", "set system"));
        assert_eq!(
            call(&core, "get_config", json!({"device": "r1", "format": "set"})).await,
            "set system"
        );
        let out = call(&core, "get_config", json!({"device": "r1", "format": "yaml"})).await;
        assert!(out.starts_with("Tool error: unsupported config format"));
    }

    #[tokio::test]
    async fn test_list_devices_is_json() {
        let core = core_with(FakeDevices::new(&["r1", "r2"]));
        let out = call(&core, "list_devices", json!({})).await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["name"], "r1");
    }

    #[tokio::test]
    async fn test_get_findings_filters_and_history() {
        let core = core_with(FakeDevices::new(&["r1"]));
        {
            let mut tracker = core.findings.lock().await;
            tracker
                .add_or_update("r1", Severity::Warning, "interfaces", "High CRC", "", "")
                .await
                .unwrap();
            tracker
                .add_or_update("r1", Severity::Critical, "chassis", "PSU failed", "", "")
                .await
                .unwrap();
            tracker
                .resolve_missing("r1", "chassis", &Default::default())
                .await
                .unwrap();
        }

        let active: Vec<Value> = serde_json::from_str(&call(&core, "get_findings", json!({})).await).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["title"], "High CRC");

        let unknown_severity: Vec<Value> =
            serde_json::from_str(&call(&core, "get_findings", json!({"severity": "urgent"})).await).unwrap();
        assert_eq!(unknown_severity.len(), 1);

        let history: Vec<Value> =
            serde_json::from_str(&call(&core, "get_findings", json!({"include_resolved": true})).await).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|f| f["resolved"] == true));
    }

    #[tokio::test]
    async fn test_unconfigured_optional_stores() {
        let core = core_with(FakeDevices::new(&["r1"]));
        assert_eq!(call(&core, "get_metrics", json!({"device": "r1"})).await, "Metrics store not configured.");
        assert_eq!(
            call(&core, "manage_heartbeat", json!({"action": "list"})).await,
            "Heartbeat not configured."
        );
        assert_eq!(
            call(&core, "save_memory", json!({"category": "user", "content": "x"})).await,
            "Memory store not configured."
        );
        assert_eq!(
            call(&core, "read_memory", json!({"category": "user"})).await,
            "Memory store not configured."
        );
    }

    #[tokio::test]
    async fn test_heartbeat_and_memory_tools() {
        let dir = TempDir::new().unwrap();
        let core = AgentCore::builder(
            Arc::new(ScriptedLlm::new()),
            Arc::new(FakeDevices::new(&["r1"])),
            Arc::new(StaticChecks::new()),
            FindingsTracker::open_in_memory().unwrap(),
        )
        .heartbeat(Arc::new(HeartbeatManager::new(dir.path().join("heartbeat.md"))))
        .memory(Arc::new(MarkdownMemory::new(dir.path().join("memory"), 8000, 24000)))
        .build();

        assert_eq!(
            call(&core, "manage_heartbeat", json!({"action": "add", "instruction": "Check NTP"})).await,
            "1. Check NTP"
        );
        assert_eq!(
            call(&core, "manage_heartbeat", json!({"action": "remove", "index": 4})).await,
            "Invalid index 4. There are 1 instruction(s)."
        );
        assert_eq!(
            call(&core, "manage_heartbeat", json!({"action": "purge"})).await,
            "Unknown heartbeat action: purge"
        );

        assert_eq!(
            call(&core, "save_memory", json!({"category": "device", "key": "r1", "content": "Lab router"})).await,
            "Saved to device/r1."
        );
        assert!(call(&core, "read_memory", json!({"category": "device", "key": "r1"}))
            .await
            .contains("Lab router"));
    }
}
