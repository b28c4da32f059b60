//! Tool definitions and the built-in default catalogue.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A tool the model may invoke; `parameters` is a JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    json!({})
}

impl ToolDefinition {
    /// Minimal definition used when the model calls a tool that is not in the
    /// catalogue.
    #[must_use]
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: String::new(),
            parameters: empty_schema(),
        }
    }
}

/// Look up a tool by name.
#[must_use]
pub fn find_tool<'a>(catalogue: &'a [ToolDefinition], name: &str) -> Option<&'a ToolDefinition> {
    catalogue.iter().find(|tool| tool.name == name)
}

/// Resolve a tool by name, falling back to [`ToolDefinition::placeholder`].
#[must_use]
pub fn resolve_tool(catalogue: &[ToolDefinition], name: &str) -> ToolDefinition {
    find_tool(catalogue, name)
        .cloned()
        .unwrap_or_else(|| ToolDefinition::placeholder(name))
}

/// Process-wide default tool catalogue, used when neither the config file nor
/// the session supplies one.
#[must_use]
pub fn default_catalogue() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "read_file".into(),
            description: "Read the contents of a file in the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path of the file to read."}
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "write_file".into(),
            description: "Write content to a file, replacing it if it exists.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path of the file to write."},
                    "content": {"type": "string", "description": "Full file content."}
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "list_directory".into(),
            description: "List the entries of a directory.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory to list."}
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "run_shell_command".into(),
            description: "Run a shell command in the workspace and return its output.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Command line to execute."}
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "search_file_content".into(),
            description: "Search files for a regular expression.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression to match."},
                    "path": {"type": "string", "description": "Directory to search from."}
                },
                "required": ["pattern"]
            }),
        },
    ]
}
