//! Wire types for the MCP stdio server

use crate::mcp::errors::McpError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol revision answered when the client does not ask for one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// JSON-RPC request or notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }
}

/// Tool entry in a `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Params of `tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(rename = "_meta", default)]
    pub meta: Option<CallMeta>,
}

/// Caller metadata carried in `params._meta`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMeta {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Header name to a single value or a list of values
    #[serde(default)]
    pub headers: Map<String, Value>,
}

/// Content item of a tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ToolContent::Text { text: text.into() }
    }
}

/// Result of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Handler output as pretty JSON text, plus structured content for object outputs
    pub fn success(output: Value) -> Self {
        let text = serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string());
        Self {
            content: vec![ToolContent::text(text)],
            structured_content: output.is_object().then_some(output),
            is_error: false,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            structured_content: None,
            is_error: true,
        }
    }
}
