//! Device access.
//!
//! The engine only sees [`DeviceManager`]. Command execution failures are
//! reported inside [`CheckResult`] rather than as errors, so a broken
//! device shows up as data in the investigation instead of aborting it.

pub mod command;

pub use command::CommandDeviceManager;

use crate::models::CheckResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reachability of a device as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Connected => "connected",
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Summary of a managed device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub status: DeviceStatus,
}

/// Output format for configuration retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Text,
    Set,
    Xml,
}

impl FromStr for ConfigFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "text" => Ok(ConfigFormat::Text),
            "set" => Ok(ConfigFormat::Set),
            "xml" => Ok(ConfigFormat::Xml),
            other => Err(format!("unsupported config format: {}", other)),
        }
    }
}

/// Operational command that retrieves configuration in `format`.
pub fn config_command(section: Option<&str>, format: ConfigFormat) -> String {
    let mut command = String::from("show configuration");
    if let Some(section) = section.map(str::trim).filter(|s| !s.is_empty()) {
        command.push(' ');
        command.push_str(section);
    }
    match format {
        ConfigFormat::Text => {}
        ConfigFormat::Set => command.push_str(" | display set"),
        ConfigFormat::Xml => command.push_str(" | display xml"),
    }
    command
}

/// Device inventory and command execution.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    /// Devices that should be monitored.
    fn connected_devices(&self) -> Vec<String>;

    fn list_devices(&self) -> Vec<DeviceInfo>;

    async fn run_command(&self, device: &str, command: &str) -> CheckResult;

    async fn get_config(&self, device: &str, section: Option<&str>, format: ConfigFormat) -> anyhow::Result<String>;

    async fn get_facts(&self, device: &str) -> anyhow::Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_format_parse() {
        assert_eq!("set".parse::<ConfigFormat>(), Ok(ConfigFormat::Set));
        assert_eq!("XML".parse::<ConfigFormat>(), Ok(ConfigFormat::Xml));
        assert_eq!("".parse::<ConfigFormat>(), Ok(ConfigFormat::Text));
        assert!("json".parse::<ConfigFormat>().is_err());
    }

    #[test]
    fn test_config_command() {
        assert_eq!(config_command(None, ConfigFormat::Text), "show configuration");
        assert_eq!(
            config_command(Some("protocols bgp"), ConfigFormat::Set),
            "show configuration protocols bgp | display set"
        );
        assert_eq!(config_command(Some("  "), ConfigFormat::Xml), "show configuration | display xml");
    }

    #[test]
    fn test_device_status_serializes_lowercase() {
        let info = DeviceInfo {
            name: "r1".to_string(),
            host: "10.0.0.1".to_string(),
            status: DeviceStatus::Connected,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["status"], "connected");
    }
}
