//! Device manager that shells out to an external client per command.
//!
//! Each device carries an argv template such as
//! `["ssh", "-p", "{port}", "{username}@{host}", "{command}"]`. The
//! template is expanded and executed directly, without a local shell.

use super::{config_command, ConfigFormat, DeviceInfo, DeviceManager, DeviceStatus};
use crate::config::DeviceConfig;
use crate::models::CheckResult;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs device commands through a configurable external program.
pub struct CommandDeviceManager {
    devices: BTreeMap<String, DeviceConfig>,
    status: Mutex<HashMap<String, DeviceStatus>>,
}

impl CommandDeviceManager {
    pub fn new(devices: Vec<DeviceConfig>) -> Self {
        let devices: BTreeMap<String, DeviceConfig> =
            devices.into_iter().map(|d| (d.name.clone(), d)).collect();
        let status = devices
            .keys()
            .map(|name| (name.clone(), DeviceStatus::Unknown))
            .collect();
        Self {
            devices,
            status: Mutex::new(status),
        }
    }

    fn status_of(&self, device: &str) -> DeviceStatus {
        self.status
            .lock()
            .ok()
            .and_then(|s| s.get(device).copied())
            .unwrap_or(DeviceStatus::Unknown)
    }

    fn set_status(&self, device: &str, status: DeviceStatus) {
        if let Ok(mut map) = self.status.lock() {
            map.insert(device.to_string(), status);
        }
    }

    async fn execute(&self, device: &DeviceConfig, command: &str) -> Result<String, ExecFailure> {
        let argv = expand_template(device, command);
        let Some((program, args)) = argv.split_first() else {
            return Err(ExecFailure::Unreachable(format!(
                "empty exec template for device '{}'",
                device.name
            )));
        };

        debug!("Executing on {}: {}", device.name, command);
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecFailure::Unreachable(format!("failed to start '{}': {}", program, e)))?;

        let output = tokio::time::timeout(Duration::from_secs(device.timeout), child.wait_with_output())
            .await
            .map_err(|_| ExecFailure::Unreachable(format!("command timed out after {}s", device.timeout)))?
            .map_err(|e| ExecFailure::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                return Err(ExecFailure::Failed(format!("command exited with {}", output.status)));
            }
            return Err(ExecFailure::Failed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Why a command produced no usable output.
#[derive(Debug)]
enum ExecFailure {
    /// The device could not be reached at all.
    Unreachable(String),
    /// The device answered with an error.
    Failed(String),
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecFailure::Unreachable(msg) | ExecFailure::Failed(msg) => f.write_str(msg),
        }
    }
}

/// Substitute device fields and the command into the argv template.
pub fn expand_template(device: &DeviceConfig, command: &str) -> Vec<String> {
    device
        .exec
        .iter()
        .map(|arg| {
            arg.replace("{name}", &device.name)
                .replace("{host}", &device.host)
                .replace("{port}", &device.port.to_string())
                .replace("{username}", &device.username)
                .replace("{command}", command)
        })
        .collect()
}

#[async_trait]
impl DeviceManager for CommandDeviceManager {
    fn connected_devices(&self) -> Vec<String> {
        self.devices
            .keys()
            .filter(|name| self.status_of(name) != DeviceStatus::Disconnected)
            .cloned()
            .collect()
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .values()
            .map(|d| DeviceInfo {
                name: d.name.clone(),
                host: d.host.clone(),
                status: self.status_of(&d.name),
            })
            .collect()
    }

    async fn run_command(&self, device: &str, command: &str) -> CheckResult {
        let Some(config) = self.devices.get(device) else {
            return CheckResult::failed(command, format!("Unknown device: {}", device));
        };

        match self.execute(config, command).await {
            Ok(output) => {
                self.set_status(device, DeviceStatus::Connected);
                CheckResult::ok(command, output)
            }
            Err(e) => {
                warn!("Command '{}' on {} failed: {}", command, device, e);
                if matches!(e, ExecFailure::Unreachable(_)) {
                    self.set_status(device, DeviceStatus::Disconnected);
                }
                CheckResult::failed(command, e.to_string())
            }
        }
    }

    async fn get_config(&self, device: &str, section: Option<&str>, format: ConfigFormat) -> Result<String> {
        let result = self.run_command(device, &config_command(section, format)).await;
        if !result.success {
            bail!("{}", result.error.unwrap_or_else(|| "configuration retrieval failed".to_string()));
        }
        Ok(result.output)
    }

    async fn get_facts(&self, device: &str) -> Result<serde_json::Value> {
        let Some(config) = self.devices.get(device) else {
            bail!("Unknown device: {}", device);
        };
        let result = self.run_command(device, "show version").await;
        if !result.success {
            bail!("{}", result.error.unwrap_or_else(|| "show version failed".to_string()));
        }
        Ok(json!({
            "name": config.name,
            "host": config.host,
            "status": self.status_of(device),
            "version": result.output.trim(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(exec: &[&str], timeout: u64) -> DeviceConfig {
        DeviceConfig {
            name: "r1".to_string(),
            host: "10.0.0.1".to_string(),
            username: "netops".to_string(),
            port: 22,
            timeout,
            exec: exec.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_expand_default_template() {
        let d = DeviceConfig {
            name: "r1".to_string(),
            host: "10.0.0.1".to_string(),
            username: "netops".to_string(),
            port: 830,
            ..DeviceConfig::default()
        };
        let argv = expand_template(&d, "show chassis alarms");
        assert_eq!(argv, vec!["ssh", "-p", "830", "netops@10.0.0.1", "show chassis alarms"]);
    }

    #[tokio::test]
    async fn test_run_command_success() {
        let manager = CommandDeviceManager::new(vec![device(&["echo", "{host}", "{command}"], 5)]);
        let result = manager.run_command("r1", "show version").await;
        assert!(result.success);
        assert_eq!(result.output.trim(), "10.0.0.1 show version");
        assert_eq!(manager.list_devices()[0].status, DeviceStatus::Connected);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let manager = CommandDeviceManager::new(vec![]);
        let result = manager.run_command("ghost", "show version").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown device"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let manager = CommandDeviceManager::new(vec![device(&["false"], 5)]);
        let result = manager.run_command("r1", "show version").await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(manager.get_config("r1", None, ConfigFormat::Text).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_disconnected() {
        let manager = CommandDeviceManager::new(vec![device(&["/nonexistent/netwarden-client"], 5)]);
        assert_eq!(manager.connected_devices(), vec!["r1".to_string()]);
        let result = manager.run_command("r1", "show version").await;
        assert!(!result.success);
        assert!(manager.connected_devices().is_empty());
    }

    #[tokio::test]
    async fn test_timeout() {
        let manager = CommandDeviceManager::new(vec![device(&["sleep", "5"], 1)]);
        let result = manager.run_command("r1", "show version").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_get_facts() {
        let manager = CommandDeviceManager::new(vec![device(&["echo", "{command}"], 5)]);
        let facts = manager.get_facts("r1").await.unwrap();
        assert_eq!(facts["version"], "show version");
        assert_eq!(facts["host"], "10.0.0.1");
    }
}
