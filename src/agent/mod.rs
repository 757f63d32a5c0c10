//! The autonomous monitoring agent.
//!
//! [`AgentCore`] is the entry point. The remaining modules are its
//! building blocks: scheduling, anomaly detection and batching, findings
//! lifecycle, conversation state, memory and the heartbeat checklist.

pub mod accumulator;
pub mod anomaly;
pub mod context;
pub mod core;
pub mod findings;
pub mod heartbeat;
pub mod memory;
pub mod metrics_store;
pub mod parse;
pub mod prompts;
pub mod scheduler;
mod tool_exec;

pub use accumulator::{AnomalyAccumulator, AnomalyBatch, AnomalyEntry};
pub use anomaly::{AnomalyConfig, AnomalyDetector};
pub use context::ConversationContext;
pub use self::core::{AgentCore, AgentCoreBuilder, AgentSettings, FindingNotifier};
pub use findings::FindingsTracker;
pub use heartbeat::HeartbeatManager;
pub use memory::{MarkdownMemory, MemoryStore};
pub use metrics_store::{MetricsStore, SqliteMetricsStore};
pub use scheduler::Scheduler;
