//! JSON-Schema parameter descriptions for the fixed tool catalog (spec
//! §4.9), consumed by the chat model via `mesh_domain::tool::ToolDefinition`.

use mesh_domain::tool::ToolDefinition;
use serde_json::json;

pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_capabilities".into(),
            description: "List every registered device and its capabilities.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "include_benchmarks": {
                        "type": "boolean",
                        "description": "Include advertised prefill/decode tokens-per-second."
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "execute_shell_cmd".into(),
            description: "Run a shell command on a device via routed execution.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "device_id": {"type": "string"},
                    "command": {"type": "string"},
                    "timeout_ms": {"type": "integer", "minimum": 1000, "maximum": 300000},
                    "working_dir": {"type": "string"}
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "get_file".into(),
            description: "Read a file from a device (or the coordinator itself).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "device_id": {"type": "string"},
                    "path": {"type": "string"},
                    "read_mode": {"type": "string", "enum": ["full", "head", "tail", "range"]},
                    "max_bytes": {"type": "integer", "minimum": 1, "maximum": 10485760},
                    "offset": {"type": "integer", "minimum": 0},
                    "length": {"type": "integer", "minimum": 0}
                },
                "required": ["path"]
            }),
        },
    ]
}
