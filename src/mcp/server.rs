//! Newline-delimited JSON-RPC server over stdio
//!
//! One server instance serves one connection and owns its [`TransportSession`].
//! `tools/call` requests run on their own tasks so slow tools do not block the
//! reader; every response goes through one mutex-guarded writer.

use crate::error::ChipError;
use crate::mcp::errors::McpError;
use crate::mcp::types::{
    CallMeta, CallToolParams, CallToolResult, McpRequest, McpResponse, Tool,
    DEFAULT_PROTOCOL_VERSION,
};
use crate::routing::{RequestContext, ToolCallEnvelope, ToolDispatcher, TransportSession};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Caller metadata carried by the transport rather than by the message itself
///
/// Over HTTP this is the inbound request's headers and `Mcp-Session-Id`; over
/// stdio it is empty and `params._meta` is the only source.
#[derive(Debug, Clone, Default)]
pub struct TransportMeta {
    pub session_id: Option<String>,
    pub headers: HeaderMap,
}

/// MCP server bound to one client connection
pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
    session: TransportSession,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            dispatcher,
            session: TransportSession::new(),
        }
    }

    /// Session id used for calls whose caller supplies none
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// Serve requests from stdin until EOF
    pub async fn run_stdio(self) -> crate::error::Result<()> {
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        Arc::new(self).serve(stdin, stdout).await
    }

    /// Serve requests read line by line from `reader`; in-flight calls finish before returning
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: Arc<Mutex<W>>) -> crate::error::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(
            session_id = %self.session.id(),
            tools = self.dispatcher.len(),
            "MCP stdio server ready - waiting for JSON-RPC messages"
        );

        let mut in_flight = JoinSet::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("stdin closed, shutting down stdio mode");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: McpRequest = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    let response = McpResponse::error(None, McpError::parse_error(format!("Invalid JSON: {}", e)));
                    write_response(&writer, &response).await;
                    continue;
                }
            };

            if request.method == "tools/call" && !request.is_notification() {
                let server = Arc::clone(&self);
                let writer = Arc::clone(&writer);
                in_flight.spawn(async move {
                    if let Some(response) = server.handle_request(request).await {
                        write_response(&writer, &response).await;
                    }
                });
            } else if let Some(response) = self.handle_request(request).await {
                write_response(&writer, &response).await;
            }

            // Reap finished calls so the set does not grow without bound
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Tool call task failed: {}", e);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Tool call task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Handle one request; notifications yield no response
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        self.handle_request_with(request, &TransportMeta::default()).await
    }

    /// Handle one request whose transport supplies caller metadata
    pub async fn handle_request_with(
        &self,
        request: McpRequest,
        transport: &TransportMeta,
    ) -> Option<McpResponse> {
        debug!(method = %request.method, "Received JSON-RPC request");

        if request.is_notification() {
            debug!("Notification {} acknowledged", request.method);
            return None;
        }
        if request.jsonrpc != "2.0" {
            return Some(McpResponse::error(
                request.id,
                McpError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => McpResponse::success(id, self.initialize_result(request.params.as_ref())),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, self.list_tools()),
            "tools/call" => match self.call_tool(request.params, transport).await {
                Ok(result) => McpResponse::success(id, result),
                Err(error) => McpResponse::error(id, error),
            },
            other => McpResponse::error(id, McpError::method_not_found(other)),
        };
        Some(response)
    }

    fn initialize_result(&self, params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": crate::SERVER_NAME,
                "version": crate::VERSION
            }
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Tool> = self
            .dispatcher
            .tools()
            .map(|d| Tool {
                name: d.name().to_string(),
                description: d.description().to_string(),
                input_schema: d.input_schema().clone(),
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>, transport: &TransportMeta) -> Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let meta = params.meta.unwrap_or_default();

        let mut headers = transport.headers.clone();
        let from_meta = forwarded_headers(&meta);
        for (name, value) in from_meta.iter() {
            headers.append(name.clone(), value.clone());
        }
        let caller_session_id = meta
            .session_id
            .filter(|id| !id.is_empty())
            .or_else(|| transport.session_id.clone().filter(|id| !id.is_empty()));

        let mut envelope = ToolCallEnvelope::new(params.name.as_str(), arguments.clone())
            .with_forwarded_headers(headers);
        if let Some(session_id) = caller_session_id {
            envelope = envelope.with_caller_session_id(session_id);
        }
        let base = RequestContext::for_transport(&self.session).with_envelope(envelope);

        let result = match self.dispatcher.dispatch(&params.name, arguments, base).await {
            Ok(output) => CallToolResult::success(output),
            Err(ChipError::UnknownTool { name }) => {
                return Err(McpError::invalid_params(format!("Unknown tool: {}", name)));
            }
            Err(e) => {
                let mut message = e.to_string();
                if e.is_auth_failure() {
                    message.push_str(". Call the auth_help tool for instructions on re-authenticating.");
                }
                CallToolResult::error(message)
            }
        };

        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }
}

/// Headers the caller forwarded in `_meta.headers`; invalid entries are skipped
fn forwarded_headers(meta: &CallMeta) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &meta.headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!("Skipping forwarded header with invalid name '{}'", name);
            continue;
        };
        let values: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(header_value) => {
                    headers.append(header_name.clone(), header_value);
                }
                Err(_) => debug!("Skipping invalid value for forwarded header '{}'", name),
            }
        }
    }
    headers
}

async fn write_response<W>(writer: &Mutex<W>, response: &McpResponse)
where
    W: AsyncWrite + Unpin,
{
    let payload = match serde_json::to_string(response) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
            return;
        }
    };

    let mut guard = writer.lock().await;
    if let Err(e) = guard.write_all(payload.as_bytes()).await {
        error!("Failed to write response to stdout: {}", e);
        return;
    }
    if let Err(e) = guard.write_all(b"\n").await {
        error!("Failed to write newline to stdout: {}", e);
        return;
    }
    if let Err(e) = guard.flush().await {
        error!("Failed to flush stdout: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;

    #[test]
    fn test_forwarded_headers_accept_string_and_list() {
        let meta: CallMeta = serde_json::from_value(json!({
            "sessionId": "s-1",
            "headers": {
                "Authorization": ["Bearer a", "Bearer b"],
                "X-Trace": "t",
                "bad header": "x"
            }
        }))
        .unwrap();

        let headers = forwarded_headers(&meta);
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 2);
        assert_eq!(headers.get("x-trace").unwrap(), "t");
        assert_eq!(headers.len(), 3);
        assert_eq!(meta.session_id.as_deref(), Some("s-1"));
    }
}
