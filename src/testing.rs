//! Scripted collaborators for unit tests.

use crate::agent::core::FindingNotifier;
use crate::checks::CheckRunner;
use crate::device::{config_command, ConfigFormat, DeviceInfo, DeviceManager, DeviceStatus};
use crate::llm::{LlmClient, Message, Response, ToolDefinition};
use crate::metrics::MetricExtractor;
use crate::models::{CheckResult, CheckResults, ExtractedMetric, Finding};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One `chat` call as seen by [`ScriptedLlm`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub with_tools: bool,
    pub system: Option<String>,
    pub max_tokens: u32,
}

impl RecordedRequest {
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Replays queued responses; once the queue is empty it repeats the
/// fallback, which defaults to an empty findings array.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<Response>>,
    fallback: Response,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Response::text("[]"),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, response: Response) -> Self {
        self.queue.lock().unwrap().push_back(response);
        self
    }

    pub fn then_text(self, text: &str) -> Self {
        self.then(Response::text(text))
    }

    pub fn repeating(mut self, response: Response) -> Self {
        self.fallback = response;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Response {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            with_tools: tools.is_some_and(|t| !t.is_empty()),
            system: system.map(str::to_string),
            max_tokens,
        });
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Device manager answering from a fixed command table.
pub struct FakeDevices {
    names: Vec<String>,
    outputs: HashMap<String, CheckResult>,
    log: Mutex<Vec<String>>,
}

impl FakeDevices {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            outputs: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, command: &str, output: &str) -> Self {
        self.outputs.insert(command.to_string(), CheckResult::ok(command, output));
        self
    }

    pub fn with_failure(mut self, command: &str, error: &str) -> Self {
        self.outputs.insert(command.to_string(), CheckResult::failed(command, error));
        self
    }

    /// `"<device>: <command>"` for every command run so far.
    pub fn commands_run(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceManager for FakeDevices {
    fn connected_devices(&self) -> Vec<String> {
        self.names.clone()
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .names
            .iter()
            .map(|name| DeviceInfo {
                name: name.clone(),
                host: format!("{}.lab", name),
                status: DeviceStatus::Connected,
            })
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    async fn run_command(&self, device: &str, command: &str) -> CheckResult {
        self.log.lock().unwrap().push(format!("{}: {}", device, command));
        if !self.names.iter().any(|n| n == device) {
            return CheckResult::failed(command, format!("Unknown device: {}", device));
        }
        self.outputs
            .get(command)
            .cloned()
            .unwrap_or_else(|| CheckResult::ok(command, ""))
    }

    async fn get_config(&self, device: &str, section: Option<&str>, format: ConfigFormat) -> Result<String> {
        let result = self.run_command(device, &config_command(section, format)).await;
        if !result.success {
            bail!("{}", result.error.unwrap_or_default());
        }
        Ok(result.output)
    }

    async fn get_facts(&self, device: &str) -> Result<serde_json::Value> {
        Ok(json!({"name": device, "model": "mx480"}))
    }
}

/// Check runner returning canned results per category.
pub struct StaticChecks {
    results: HashMap<String, CheckResults>,
}

impl StaticChecks {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
        }
    }

    pub fn with_output(mut self, category: &str, command: &str, output: &str) -> Self {
        self.results
            .entry(category.to_string())
            .or_default()
            .insert(command.to_string(), CheckResult::ok(command, output));
        self
    }

    pub fn with_failure(mut self, category: &str, command: &str, error: &str) -> Self {
        self.results
            .entry(category.to_string())
            .or_default()
            .insert(command.to_string(), CheckResult::failed(command, error));
        self
    }
}

#[async_trait]
impl CheckRunner for StaticChecks {
    async fn run_category(&self, category: &str, _device: &str) -> CheckResults {
        self.results.get(category).cloned().unwrap_or_default()
    }
}

/// Extractor returning queued metric sets, one per call; the last set repeats.
pub struct FixedExtractor {
    queue: Mutex<VecDeque<Vec<ExtractedMetric>>>,
    fail: bool,
}

impl FixedExtractor {
    pub fn new(metrics: Vec<ExtractedMetric>) -> Self {
        Self::sequence(vec![metrics])
    }

    pub fn sequence(sets: Vec<Vec<ExtractedMetric>>) -> Self {
        Self {
            queue: Mutex::new(sets.into()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fail: true,
        }
    }
}

impl MetricExtractor for FixedExtractor {
    fn extract(&self, _results: &CheckResults) -> Result<Vec<ExtractedMetric>> {
        if self.fail {
            bail!("unparseable output");
        }
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            return Ok(queue.pop_front().unwrap_or_default());
        }
        Ok(queue.front().cloned().unwrap_or_default())
    }
}

/// Notifier that keeps every event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Finding, bool)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(Finding, bool)> {
        self.events.lock().unwrap().clone()
    }

    /// `(title, is_new)` pairs, in notification order.
    pub fn summary(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .map(|(f, is_new)| (f.title, is_new))
            .collect()
    }
}

#[async_trait]
impl FindingNotifier for RecordingNotifier {
    async fn notify(&self, finding: &Finding, is_new: bool) {
        self.events.lock().unwrap().push((finding.clone(), is_new));
    }
}
