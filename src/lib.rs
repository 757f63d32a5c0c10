//! NetWarden - autonomous health monitoring for network device fleets.
//!
//! Scheduled health checks feed a statistical anomaly pipeline; anomalies
//! that fire together on a device are investigated by an LLM in one tool
//! loop, and the resulting diagnoses are tracked as findings that open,
//! refresh and resolve across check cycles.

pub mod agent;
pub mod checks;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod report;
pub mod store;

#[cfg(test)]
mod testing;
