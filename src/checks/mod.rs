//! Check categories.
//!
//! A category is a named list of commands. Running it produces one
//! [`CheckResult`] per command; individual failures stay inside the map.

use crate::device::DeviceManager;
use crate::models::CheckResults;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executes the commands of a check category against a device.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run_category(&self, category: &str, device: &str) -> CheckResults;
}

/// Commands per category, executed through a [`DeviceManager`].
pub struct CheckRegistry {
    checks: BTreeMap<String, Vec<String>>,
    devices: Arc<dyn DeviceManager>,
}

impl CheckRegistry {
    pub fn new(checks: BTreeMap<String, Vec<String>>, devices: Arc<dyn DeviceManager>) -> Self {
        Self { checks, devices }
    }

    pub fn commands(&self, category: &str) -> &[String] {
        self.checks.get(category).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait]
impl CheckRunner for CheckRegistry {
    async fn run_category(&self, category: &str, device: &str) -> CheckResults {
        let commands = self.commands(category);
        if commands.is_empty() {
            warn!("No commands configured for check category '{}'", category);
            return CheckResults::new();
        }

        debug!("Running {} {} commands on {}", commands.len(), category, device);
        let mut results = CheckResults::new();
        for command in commands {
            let result = self.devices.run_command(device, command).await;
            results.insert(command.clone(), result);
        }
        results
    }
}
