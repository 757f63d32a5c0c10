//! The monitoring and investigation engine.
//!
//! [`AgentCore`] ties the scheduler, the anomaly pipeline, the accumulator
//! and the findings tracker together, and drives the bounded LLM tool
//! loop for scheduled checks, correlated batches, heartbeat cycles and
//! interactive questions.

use super::accumulator::{AnomalyAccumulator, AnomalyBatch, BatchCallback};
use super::anomaly::{AnomalyConfig, AnomalyDetector};
use super::context::ConversationContext;
use super::findings::FindingsTracker;
use super::heartbeat::HeartbeatManager;
use super::memory::MemoryStore;
use super::metrics_store::MetricsStore;
use super::parse::{parse_findings, ReportedFinding};
use super::prompts;
use super::scheduler::{jitter_secs, CheckCallback, Scheduler};
use crate::checks::CheckRunner;
use crate::config::Config;
use crate::device::DeviceManager;
use crate::llm::{agent_tools, LlmClient, Message, Role, ToolDefinition};
use crate::metrics::ExtractorSet;
use crate::models::{AnomalyResult, CheckResults, Finding, MetricPoint, Severity};
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Returned when the tool loop runs out of iterations.
pub const MAX_ITERATIONS_REACHED: &str = "Maximum tool iterations reached.";

const SUMMARY_FALLBACK: &str = "(Context was compacted but summarization failed.)";
const KEEP_RECENT_ON_COMPACT: usize = 10;
const MEMORY_FLUSH_ITERATIONS: usize = 5;
const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Device key used for heartbeat findings.
pub const HEARTBEAT_DEVICE: &str = "*";
pub const HEARTBEAT_CATEGORY: &str = "heartbeat";

/// Receives new and resolved findings.
#[async_trait]
pub trait FindingNotifier: Send + Sync {
    async fn notify(&self, finding: &Finding, is_new: bool);
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub max_context_messages: usize,
    pub max_tokens: u32,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
    /// User-triggered checks skip the accumulator.
    pub bypass_on_user_trigger: bool,
    /// Seconds between heartbeat cycles; `None` disables the loop.
    pub heartbeat_interval: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_context_messages: 50,
            max_tokens: 4096,
            system_prompt: None,
            bypass_on_user_trigger: true,
            heartbeat_interval: None,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.agent.max_iterations.max(1),
            max_context_messages: config.agent.max_context_messages,
            max_tokens: config.llm.max_tokens,
            system_prompt: config.llm.system_prompt.clone(),
            bypass_on_user_trigger: config.correlation.bypass_on_user_trigger,
            heartbeat_interval: config.heartbeat.enabled.then_some(config.heartbeat.interval),
        }
    }
}

/// Result of one tool loop run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoopOutcome {
    pub text: String,
    /// False when the backend failed or the iteration cap was hit.
    pub complete: bool,
}

impl LoopOutcome {
    fn answer(text: String) -> Self {
        Self { text, complete: true }
    }

    fn incomplete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            complete: false,
        }
    }
}

/// Collects the collaborators for an [`AgentCore`].
pub struct AgentCoreBuilder {
    settings: AgentSettings,
    llm: Arc<dyn LlmClient>,
    devices: Arc<dyn DeviceManager>,
    checks: Arc<dyn CheckRunner>,
    findings: FindingsTracker,
    extractors: ExtractorSet,
    metrics: Option<(Arc<dyn MetricsStore>, AnomalyConfig)>,
    correlation_window: Option<Duration>,
    heartbeat: Option<Arc<HeartbeatManager>>,
    memory: Option<Arc<dyn MemoryStore>>,
    schedule: BTreeMap<String, u64>,
    device_schedules: HashMap<String, BTreeMap<String, u64>>,
}

impl AgentCoreBuilder {
    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = extractors;
        self
    }

    /// Enables metric recording and anomaly detection.
    pub fn metrics_store(mut self, store: Arc<dyn MetricsStore>, anomaly: AnomalyConfig) -> Self {
        self.metrics = Some((store, anomaly));
        self
    }

    /// Enables cross-category correlation with the given quiet window.
    pub fn correlation(mut self, window: Duration) -> Self {
        self.correlation_window = Some(window);
        self
    }

    pub fn heartbeat(mut self, manager: Arc<HeartbeatManager>) -> Self {
        self.heartbeat = Some(manager);
        self
    }

    pub fn memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn schedule(
        mut self,
        intervals: BTreeMap<String, u64>,
        device_overrides: HashMap<String, BTreeMap<String, u64>>,
    ) -> Self {
        self.schedule = intervals;
        self.device_schedules = device_overrides;
        self
    }

    pub fn build(self) -> Arc<AgentCore> {
        let accumulator = self.correlation_window.map(AnomalyAccumulator::new);
        let (metrics, detector) = match self.metrics {
            Some((store, anomaly)) => {
                let detector = AnomalyDetector::new(Arc::clone(&store), anomaly);
                (Some(store), Some(detector))
            }
            None => (None, None),
        };

        Arc::new_cyclic(|weak: &Weak<AgentCore>| {
            if let Some(accumulator) = &accumulator {
                accumulator.set_callback(batch_callback(weak.clone()));
            }

            AgentCore {
                interactive: Mutex::new(ConversationContext::new(self.settings.max_context_messages)),
                settings: self.settings,
                llm: self.llm,
                devices: self.devices,
                checks: self.checks,
                extractors: self.extractors,
                findings: Arc::new(Mutex::new(self.findings)),
                metrics,
                detector,
                accumulator,
                heartbeat: self.heartbeat,
                memory: self.memory,
                notifier: OnceLock::new(),
                tools: agent_tools(),
                scheduler: Mutex::new(Scheduler::new(self.schedule, self.device_schedules)),
                heartbeat_task: Mutex::new(None),
                running: AtomicBool::new(false),
            }
        })
    }
}

fn batch_callback(weak: Weak<AgentCore>) -> BatchCallback {
    Arc::new(move |batch: AnomalyBatch| {
        let weak = weak.clone();
        async move {
            match weak.upgrade() {
                Some(core) => core.investigate_batch(batch).await,
                None => Ok(()),
            }
        }
        .boxed()
    })
}

/// Central orchestrator.
pub struct AgentCore {
    pub(crate) settings: AgentSettings,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) devices: Arc<dyn DeviceManager>,
    checks: Arc<dyn CheckRunner>,
    extractors: ExtractorSet,
    pub(crate) findings: Arc<Mutex<FindingsTracker>>,
    pub(crate) metrics: Option<Arc<dyn MetricsStore>>,
    detector: Option<AnomalyDetector>,
    accumulator: Option<AnomalyAccumulator>,
    pub(crate) heartbeat: Option<Arc<HeartbeatManager>>,
    pub(crate) memory: Option<Arc<dyn MemoryStore>>,
    notifier: OnceLock<Arc<dyn FindingNotifier>>,
    tools: Vec<ToolDefinition>,
    interactive: Mutex<ConversationContext>,
    scheduler: Mutex<Scheduler>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl AgentCore {
    pub fn builder(
        llm: Arc<dyn LlmClient>,
        devices: Arc<dyn DeviceManager>,
        checks: Arc<dyn CheckRunner>,
        findings: FindingsTracker,
    ) -> AgentCoreBuilder {
        AgentCoreBuilder {
            settings: AgentSettings::default(),
            llm,
            devices,
            checks,
            findings,
            extractors: ExtractorSet::new(),
            metrics: None,
            correlation_window: None,
            heartbeat: None,
            memory: None,
            schedule: BTreeMap::new(),
            device_schedules: HashMap::new(),
        }
    }

    /// Register the finding notifier. Only the first registration takes effect.
    pub fn set_notifier(&self, notifier: Arc<dyn FindingNotifier>) {
        if self.notifier.set(notifier).is_err() {
            warn!("Finding notifier already registered; ignoring replacement");
        }
    }

    /// Shared findings tracker, for reporting.
    pub fn findings(&self) -> Arc<Mutex<FindingsTracker>> {
        Arc::clone(&self.findings)
    }

    pub fn is_monitoring(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start scheduled checks and, when configured, the heartbeat loop.
    ///
    /// Calling it again while monitoring is a no-op.
    pub async fn start_monitoring(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let devices = self.devices.connected_devices();
        if devices.is_empty() {
            warn!("No connected devices, scheduler not started");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        let weak = Arc::downgrade(self);
        let callback: CheckCallback = Arc::new(move |category: String, device: String| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(core) => core.run_check(&category, &device, false).await,
                    None => Ok(()),
                }
            }
            .boxed()
        });
        self.scheduler.lock().await.start(&devices, callback);
        info!("Monitoring started for devices: {}", devices.join(", "));

        if let (Some(interval), Some(_)) = (self.settings.heartbeat_interval, &self.heartbeat) {
            let weak = Arc::downgrade(self);
            let task = tokio::spawn(heartbeat_loop(weak, interval.max(1)));
            *self.heartbeat_task.lock().await = Some(task);
            info!("Heartbeat loop started (interval={}s)", interval);
        }
    }

    /// Stop the heartbeat loop, then the scheduler, then flush the accumulator.
    pub async fn stop_monitoring(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Heartbeat loop ended abnormally: {}", e);
                }
            }
            info!("Heartbeat loop stopped");
        }

        self.scheduler.lock().await.stop().await;

        if let Some(accumulator) = &self.accumulator {
            accumulator.stop().await;
        }
    }

    /// Answer an operator question through the interactive conversation.
    pub async fn handle_user_input(&self, input: &str) -> String {
        let mut ctx = self.interactive.lock().await;
        ctx.add_user(input);
        if ctx.needs_compaction() {
            self.compact_context(&mut ctx).await;
        }
        ctx.trim();
        self.run_tool_loop(&mut ctx, self.settings.max_iterations).await.text
    }

    /// Most recent user and assistant turns of the interactive conversation.
    pub async fn chat_history(&self, limit: usize) -> Vec<Message> {
        let ctx = self.interactive.lock().await;
        let visible: Vec<Message> = ctx
            .raw_messages()
            .iter()
            .filter(|m| match m.role {
                Role::User => true,
                Role::Assistant => !m.content.trim().is_empty(),
                _ => false,
            })
            .cloned()
            .collect();
        let skip = visible.len().saturating_sub(limit);
        visible.into_iter().skip(skip).collect()
    }

    /// Run one check cycle for `(category, device)`.
    pub async fn run_check(&self, category: &str, device: &str, user_triggered: bool) -> Result<()> {
        info!("Running {} check on {}", category, device);

        let results = self.checks.run_category(category, device).await;
        if results.is_empty() {
            return Ok(());
        }

        let anomalies = self.extract_and_check(category, device, &results).await;
        let data = format_raw_data(&results);

        if self.extractors.has(category) && anomalies.is_empty() {
            info!("{} check on {}: Normal", category, device);
            return Ok(());
        }

        let prompt = if anomalies.is_empty() {
            prompts::analysis(device, category, &data)
        } else {
            info!("{} check on {}: {} anomaly(s) detected", category, device, anomalies.len());

            if let Some(accumulator) = &self.accumulator {
                if !(user_triggered && self.settings.bypass_on_user_trigger) {
                    accumulator.submit(device, category, anomalies, data).await;
                    return Ok(());
                }
            }

            let lines = anomaly_lines(&anomalies);
            let context = self.gather_investigation_context(device, Some(category)).await;
            prompts::anomaly(device, category, &lines, &data, &context)
        };

        let mut ctx = ConversationContext::new(self.settings.max_context_messages);
        ctx.add_user(prompt);
        let outcome = self.run_tool_loop(&mut ctx, self.settings.max_iterations).await;
        if !outcome.complete {
            warn!("Analysis of {}/{} did not finish: {}", category, device, outcome.text);
            return Ok(());
        }
        self.process_analysis(device, category, &outcome.text).await
    }

    /// Run one heartbeat cycle. An empty checklist skips the cycle.
    pub async fn run_heartbeat(&self) -> Result<()> {
        let Some(manager) = &self.heartbeat else {
            return Ok(());
        };
        let instructions = manager.get_instructions();
        if instructions.trim().is_empty() {
            debug!("Heartbeat: no instructions configured, skipping");
            return Ok(());
        }

        info!("Running heartbeat cycle");
        let mut ctx = ConversationContext::new(self.settings.max_context_messages);
        ctx.add_user(prompts::heartbeat(&instructions));
        let outcome = self.run_tool_loop(&mut ctx, self.settings.max_iterations).await;
        if !outcome.complete {
            warn!("Heartbeat analysis did not finish: {}", outcome.text);
            return Ok(());
        }
        self.process_analysis(HEARTBEAT_DEVICE, HEARTBEAT_CATEGORY, &outcome.text).await
    }

    /// Investigate every category of a flushed accumulator batch at once.
    pub async fn investigate_batch(&self, batch: AnomalyBatch) -> Result<()> {
        let categories = batch.categories();
        info!("Investigating correlated anomalies on {}: {}", batch.device, categories.join(", "));

        let blocks = batch
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "=== {} ===\nDetected anomalies:\n{}\n\nRaw command output:\n{}\n",
                    entry.category,
                    anomaly_lines(&entry.anomalies),
                    entry.raw_data
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let context = self.gather_investigation_context(&batch.device, None).await;
        let prompt = prompts::correlated(&batch.device, &categories, &blocks, &context);

        let mut ctx = ConversationContext::new(self.settings.max_context_messages);
        ctx.add_user(prompt);
        let outcome = self.run_tool_loop(&mut ctx, self.settings.max_iterations).await;
        if !outcome.complete {
            warn!("Correlated investigation on {} did not finish: {}", batch.device, outcome.text);
            return Ok(());
        }

        for (category, items) in group_by_category(&categories, parse_findings(&outcome.text)) {
            self.reconcile(&batch.device, &category, &items).await?;
        }
        Ok(())
    }

    /// Parse a final answer and reconcile it into the tracker.
    pub async fn process_analysis(&self, device: &str, category: &str, analysis: &str) -> Result<()> {
        let reported = parse_findings(analysis);
        self.reconcile(device, category, &reported).await
    }

    /// Add or refresh reported findings, resolve the ones no longer reported,
    /// then notify outside the tracker lock.
    async fn reconcile(&self, device: &str, category: &str, reported: &[ReportedFinding]) -> Result<()> {
        let mut notifications = Vec::new();
        {
            let mut tracker = self.findings.lock().await;
            let mut titles = HashSet::new();
            for item in reported {
                titles.insert(item.title.clone());
                let (finding, is_new) = tracker
                    .add_or_update(
                        device,
                        item.severity,
                        category,
                        &item.title,
                        &item.detail,
                        &item.recommendation,
                    )
                    .await?;
                if is_new {
                    notifications.push((finding, true));
                }
            }

            for finding in tracker.resolve_missing(device, category, &titles).await? {
                notifications.push((finding, false));
            }
        }

        if let Some(notifier) = self.notifier.get() {
            for (finding, is_new) in &notifications {
                notifier.notify(finding, *is_new).await;
            }
        }
        Ok(())
    }

    /// Extract, test and record metrics. Any failure means "no anomalies".
    async fn extract_and_check(&self, category: &str, device: &str, results: &CheckResults) -> Vec<AnomalyResult> {
        let Some(store) = &self.metrics else {
            return Vec::new();
        };
        let Some(extractor) = self.extractors.get(category) else {
            return Vec::new();
        };

        let extracted = match extractor.extract(results) {
            Ok(extracted) => extracted,
            Err(e) => {
                error!("Metric extraction failed for {}/{}: {:#}", category, device, e);
                return Vec::new();
            }
        };
        if extracted.is_empty() {
            return Vec::new();
        }

        let mut points = Vec::with_capacity(extracted.len());
        for metric in extracted {
            let mut point = MetricPoint::new(device, category, &metric.metric, metric.value, &metric.unit);
            point.tags = metric.tags.clone();
            points.push(point);

            if !metric.is_counter {
                continue;
            }
            match store.latest(device, &metric.metric).await {
                Ok(Some(previous)) => {
                    let delta_name = format!("{}_delta", metric.metric);
                    let delta = (metric.value - previous.value).max(0.0);
                    let mut point = MetricPoint::new(device, category, &delta_name, delta, &metric.unit);
                    point.tags = metric.tags;
                    points.push(point);
                }
                Ok(None) => {}
                Err(e) => warn!("Could not read previous {} on {}: {:#}", metric.metric, device, e),
            }
        }

        // Detect against history first so the baseline excludes this sample.
        let anomalies = match &self.detector {
            Some(detector) => match detector.check_many(device, &points).await {
                Ok(anomalies) => anomalies,
                Err(e) => {
                    error!("Anomaly detection failed for {}/{}: {:#}", category, device, e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let Err(e) = store.record_many(&points).await {
            error!("Failed to record {} metrics for {}: {:#}", category, device, e);
        }
        anomalies
    }

    /// Active findings elsewhere on the device and fleet-wide critical or
    /// warning findings. `category` is excluded for the same device.
    pub async fn gather_investigation_context(&self, device: &str, category: Option<&str>) -> String {
        let tracker = self.findings.lock().await;
        let mut lines = Vec::new();

        for f in tracker.get_active(Some(device), None, None) {
            if category == Some(f.category.as_str()) {
                continue;
            }
            lines.push(format!(
                "  [{}] {}: {} - {}",
                f.severity.as_str().to_uppercase(),
                f.category,
                f.title,
                f.detail
            ));
        }

        for severity in [Severity::Critical, Severity::Warning] {
            for f in tracker.get_active(None, Some(severity), None) {
                if f.device == device {
                    continue;
                }
                lines.push(format!(
                    "  [{}] {}/{}: {}",
                    f.severity.as_str().to_uppercase(),
                    f.device,
                    f.category,
                    f.title
                ));
            }
        }

        if lines.is_empty() {
            return String::new();
        }
        format!("\nRelated active findings across the network:\n{}\n\n", lines.join("\n"))
    }

    fn base_system_prompt(&self) -> &str {
        self.settings
            .system_prompt
            .as_deref()
            .unwrap_or(prompts::SYSTEM_PROMPT)
    }

    fn build_system_prompt(&self) -> String {
        let base = self.base_system_prompt();
        let Some(memory) = &self.memory else {
            return base.to_string();
        };
        let context = memory.build_context(&self.devices.connected_devices());
        if context.is_empty() {
            base.to_string()
        } else {
            format!("{}\n\n{}", base, context)
        }
    }

    /// Flush memories from a copy of the conversation, summarise it, then compact.
    async fn compact_context(&self, ctx: &mut ConversationContext) {
        info!("Compacting conversation context ({} messages)", ctx.message_count());

        if self.memory.is_some() {
            let mut flush = ctx.detached_copy(KEEP_RECENT_ON_COMPACT);
            flush.add_user(prompts::MEMORY_FLUSH_PROMPT);
            let outcome = self.run_tool_loop(&mut flush, MEMORY_FLUSH_ITERATIONS).await;
            if !outcome.complete {
                warn!("Memory flush did not finish: {}", outcome.text);
            }
        }

        let mut messages = ctx.messages();
        messages.push(Message::user(prompts::SUMMARIZE_PROMPT));
        let response = self
            .llm
            .chat(&messages, None, Some(self.base_system_prompt()), SUMMARY_MAX_TOKENS)
            .await;
        let summary = if response.is_error() || response.content.trim().is_empty() {
            warn!("Context summarization failed: {}", response.content);
            SUMMARY_FALLBACK.to_string()
        } else {
            response.content
        };

        ctx.compact(summary, KEEP_RECENT_ON_COMPACT);
        info!("Context compacted, summary length: {} chars", ctx.summary().map_or(0, str::len));
    }

    /// Call the backend until it answers without tool calls, at most `max_iterations` times.
    pub(crate) async fn run_tool_loop(&self, ctx: &mut ConversationContext, max_iterations: usize) -> LoopOutcome {
        let system = self.build_system_prompt();

        for _ in 0..max_iterations {
            let response = self
                .llm
                .chat(&ctx.messages(), Some(&self.tools), Some(&system), self.settings.max_tokens)
                .await;

            if !response.has_tool_calls() {
                if response.is_error() {
                    warn!("LLM call failed: {}", response.content);
                    return LoopOutcome::incomplete(response.content);
                }
                if !response.content.is_empty() {
                    ctx.add_assistant(Message::assistant(response.content.clone()));
                }
                return LoopOutcome::answer(response.content);
            }

            ctx.add_assistant(Message::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                debug!("Tool call {}: {}", call.id, call.name);
                let result = self.execute_tool(call).await;
                ctx.add_tool_result(&call.id, result);
            }
        }

        warn!("Tool loop hit the limit of {} iterations", max_iterations);
        LoopOutcome::incomplete(MAX_ITERATIONS_REACHED)
    }
}

async fn heartbeat_loop(core: Weak<AgentCore>, interval: u64) {
    let jitter = jitter_secs(HEARTBEAT_CATEGORY, HEARTBEAT_DEVICE, interval);
    tokio::time::sleep(Duration::from_secs(jitter)).await;

    loop {
        let Some(agent) = core.upgrade() else {
            return;
        };
        if let Err(e) = agent.run_heartbeat().await {
            error!("Heartbeat cycle failed: {:#}", e);
        }
        drop(agent);
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

/// `--- <command> [SUCCESS|FAILED: <error>] ---` blocks, one per command.
fn format_raw_data(results: &CheckResults) -> String {
    results
        .iter()
        .map(|(command, result)| {
            let status = if result.success {
                "SUCCESS".to_string()
            } else {
                format!("FAILED: {}", result.error.as_deref().unwrap_or("unknown error"))
            };
            format!("--- {} [{}] ---\n{}\n", command, status, result.output)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn anomaly_lines(anomalies: &[AnomalyResult]) -> String {
    anomalies
        .iter()
        .map(AnomalyResult::to_context_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bucket findings by their `category`, in batch order. Missing or unknown
/// categories go to the first batch category. Every batch category gets a
/// bucket, possibly empty, so stale findings there are resolved too.
fn group_by_category(categories: &[String], reported: Vec<ReportedFinding>) -> Vec<(String, Vec<ReportedFinding>)> {
    let mut order: Vec<String> = Vec::new();
    for category in categories {
        if !order.contains(category) {
            order.push(category.clone());
        }
    }
    let Some(fallback) = order.first().cloned() else {
        return Vec::new();
    };

    let mut buckets: HashMap<String, Vec<ReportedFinding>> =
        order.iter().map(|c| (c.clone(), Vec::new())).collect();
    for item in reported {
        let category = item
            .category
            .clone()
            .filter(|c| buckets.contains_key(c))
            .unwrap_or_else(|| fallback.clone());
        buckets.entry(category).or_default().push(item);
    }

    order
        .into_iter()
        .map(|category| {
            let items = buckets.remove(&category).unwrap_or_default();
            (category, items)
        })
        .collect()
}
