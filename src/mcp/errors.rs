//! JSON-RPC 2.0 error codes and error objects

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used by the stdio server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl McpErrorCode {
    /// Get the error code as i32
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new<S: Into<String>>(code: McpErrorCode, message: S) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(McpErrorCode::MethodNotFound, format!("Method not found: {}", method))
    }

    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }
}
