//! Tool definitions offered to the model.
//!
//! The catalog is fixed: every investigation, heartbeat and interactive
//! conversation sees the same set of tools. Execution lives in
//! `agent::tool_exec`.

use super::types::ToolDefinition;
use serde_json::json;

/// Check categories the model may trigger with `run_health_check`.
pub const HEALTH_CHECK_CATEGORIES: &[&str] = &["chassis", "interfaces", "routing", "system", "config"];

/// Get the tool definitions for the agent.
pub fn agent_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::function(
            "run_command",
            "Execute an operational command on a device. Use this for any 'show' command. \
             Examples: 'show chassis alarms', 'show bgp summary', 'show interfaces terse'.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Name of the target device (e.g., 'mx-core-01')"
                    },
                    "command": {
                        "type": "string",
                        "description": "The operational command to execute"
                    }
                },
                "required": ["device", "command"]
            }),
        ),
        ToolDefinition::function(
            "get_config",
            "Retrieve device configuration, either in full or a specific section.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Name of the target device"
                    },
                    "section": {
                        "type": "string",
                        "description": "Configuration section (e.g., 'protocols bgp'). Omit for full config."
                    },
                    "format": {
                        "type": "string",
                        "enum": ["text", "set", "xml"],
                        "description": "Output format (default: text)"
                    }
                },
                "required": ["device"]
            }),
        ),
        ToolDefinition::function(
            "get_device_facts",
            "Get device information such as model, software version, serial number and uptime.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Name of the target device"
                    }
                },
                "required": ["device"]
            }),
        ),
        ToolDefinition::function(
            "list_devices",
            "List all managed devices and their current connection status.",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        ToolDefinition::function(
            "get_findings",
            "Retrieve current and historical findings from health checks. \
             Filter by device, severity, or category.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Filter by device name (optional)"
                    },
                    "severity": {
                        "type": "string",
                        "enum": ["critical", "warning", "info"],
                        "description": "Filter by severity (optional)"
                    },
                    "category": {
                        "type": "string",
                        "description": "Filter by category (optional)"
                    },
                    "include_resolved": {
                        "type": "boolean",
                        "description": "Include resolved findings (default: false)"
                    }
                }
            }),
        ),
        ToolDefinition::function(
            "run_health_check",
            "Trigger a health check category immediately and return the resulting findings.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Target device name"
                    },
                    "category": {
                        "type": "string",
                        "enum": HEALTH_CHECK_CATEGORIES,
                        "description": "Health check category to run"
                    }
                },
                "required": ["device", "category"]
            }),
        ),
        ToolDefinition::function(
            "get_metrics",
            "Retrieve time-series metrics for a device. Omit 'metric' to list \
             available metric names; provide one to get its recent values.",
            json!({
                "type": "object",
                "properties": {
                    "device": {
                        "type": "string",
                        "description": "Name of the target device"
                    },
                    "metric": {
                        "type": "string",
                        "description": "Metric name to query (omit to list available metrics)"
                    },
                    "since_hours": {
                        "type": "integer",
                        "description": "How many hours of history to retrieve (default: 24)"
                    }
                },
                "required": ["device"]
            }),
        ),
        ToolDefinition::function(
            "manage_heartbeat",
            "Manage the heartbeat checklist of periodic monitoring instructions. \
             Use 'list' to view, 'add' to append, 'remove' to delete by number, \
             'replace' to overwrite all.",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["list", "add", "remove", "replace"],
                        "description": "The action to perform"
                    },
                    "instruction": {
                        "type": "string",
                        "description": "Instruction text (for add) or full new content (for replace)"
                    },
                    "index": {
                        "type": "integer",
                        "description": "1-based line number to remove (for remove)"
                    }
                },
                "required": ["action"]
            }),
        ),
        ToolDefinition::function(
            "save_memory",
            "Persist an observation across sessions: device quirks and baselines, \
             operator preferences, or incident records.",
            json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["device", "user", "incident"],
                        "description": "Memory category"
                    },
                    "key": {
                        "type": "string",
                        "description": "Device name or incident slug (not needed for 'user')"
                    },
                    "content": {
                        "type": "string",
                        "description": "Markdown text to store"
                    }
                },
                "required": ["category", "content"]
            }),
        ),
        ToolDefinition::function(
            "read_memory",
            "Read persistent memory. Omit 'key' to list the stored entries of a category.",
            json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["device", "user", "incident"],
                        "description": "Memory category"
                    },
                    "key": {
                        "type": "string",
                        "description": "Device name or incident slug (optional)"
                    }
                },
                "required": ["category"]
            }),
        ),
    ]
}
