//! Tests for the stdio JSON-RPC server

use chip::clients::ApiClient;
use chip::config::ApiConfig;
use chip::error::ChipError;
use chip::mcp::{McpRequest, McpServer};
use chip::routing::{
    LoggingMiddleware, MiddlewareChain, RequestContext, TargetHostMiddleware, ToolDescriptor,
    ToolDispatcher, ToolFilter,
};
use chip::tools;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

fn request(id: u64, method: &str, params: Value) -> McpRequest {
    serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    }))
    .unwrap()
}

fn server() -> Arc<McpServer> {
    let middleware = MiddlewareChain::new()
        .add_middleware(Arc::new(TargetHostMiddleware::new("https://acme.collibra.com")))
        .add_middleware(Arc::new(LoggingMiddleware::new()));
    let mut dispatcher = ToolDispatcher::new(middleware);

    let config = ApiConfig {
        url: Some("https://acme.collibra.com".to_string()),
        ..Default::default()
    };
    let client = Arc::new(ApiClient::from_config(&config).unwrap());
    tools::register_all(&mut dispatcher, client, &ToolFilter::default()).unwrap();

    dispatcher
        .register(ToolDescriptor::new(
            "whoami",
            "reports the call context",
            |ctx: RequestContext, _input: Value| async move {
                Ok::<Value, ChipError>(json!({
                    "session_id": ctx.session_id()?,
                    "authorization": ctx
                        .envelope()?
                        .forwarded_headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                }))
            },
        ))
        .unwrap();
    dispatcher
        .register(ToolDescriptor::new(
            "unauthorized",
            "always fails like an expired session",
            |_ctx: RequestContext, _input: Value| async move {
                Err::<Value, _>(ChipError::SsoCancelled)
            },
        ))
        .unwrap();

    Arc::new(McpServer::new(Arc::new(dispatcher)))
}

#[tokio::test]
async fn test_initialize_and_ping() {
    let server = server();

    let response = server
        .handle_request(request(1, "initialize", json!({ "protocolVersion": "2025-03-26" })))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "chip");
    assert!(result["capabilities"]["tools"].is_object());

    let pong = server.handle_request(request(2, "ping", json!({}))).await.unwrap();
    assert_eq!(pong.result, Some(json!({})));
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server();
    let notification: McpRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }))
    .unwrap();
    assert!(server.handle_request(notification).await.is_none());
}

#[tokio::test]
async fn test_tools_list_includes_auth_help() {
    let server = server();
    let response = server.handle_request(request(1, "tools/list", json!({}))).await.unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();

    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(names, vec!["auth_help", "unauthorized", "whoami"]);
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_auth_help_uses_target_host() {
    let server = server();
    let response = server
        .handle_request(request(1, "tools/call", json!({ "name": "auth_help" })))
        .await
        .unwrap();
    let result = response.result.unwrap();

    assert_eq!(result["isError"], false);
    let instructions = result["structuredContent"]["instructions"].as_str().unwrap();
    assert!(instructions.contains(r#"--api-url "https://acme.collibra.com" --sso-auth"#));
}

#[tokio::test]
async fn test_call_meta_reaches_the_handler() {
    let server = server();
    let response = server
        .handle_request(request(
            7,
            "tools/call",
            json!({
                "name": "whoami",
                "arguments": {},
                "_meta": {
                    "sessionId": "caller-session",
                    "headers": { "Authorization": "Bearer token" }
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.id, json!(7));
    let output = &response.result.unwrap()["structuredContent"];
    assert_eq!(output["session_id"], "caller-session");
    assert_eq!(output["authorization"], "Bearer token");

    // Without a caller id the connection's session id is used
    let response = server
        .handle_request(request(8, "tools/call", json!({ "name": "whoami" })))
        .await
        .unwrap();
    assert_eq!(
        response.result.unwrap()["structuredContent"]["session_id"],
        server.session_id()
    );
}

#[tokio::test]
async fn test_tool_failure_is_an_error_result() {
    let server = server();
    let response = server
        .handle_request(request(1, "tools/call", json!({ "name": "unauthorized" })))
        .await
        .unwrap();

    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("auth_help"));
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = server();

    let unknown_tool = server
        .handle_request(request(1, "tools/call", json!({ "name": "nope" })))
        .await
        .unwrap();
    assert_eq!(unknown_tool.error.unwrap().code, -32602);

    let unknown_method = server
        .handle_request(request(2, "resources/list", json!({})))
        .await
        .unwrap();
    assert_eq!(unknown_method.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_serve_over_lines() {
    let server = server();
    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "this is not json",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"whoami"}}"#,
        "",
    ]
    .join("\n");

    let output = Arc::new(Mutex::new(Vec::<u8>::new()));
    server
        .serve(input.as_bytes(), Arc::clone(&output))
        .await
        .unwrap();

    let written = output.lock().await;
    let responses: Vec<Value> = String::from_utf8(written.clone())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(responses.len(), 3);
    assert!(responses.iter().any(|r| r["id"] == 1 && r["result"]["serverInfo"].is_object()));
    assert!(responses.iter().any(|r| r["error"]["code"] == -32700));
    assert!(responses
        .iter()
        .any(|r| r["id"] == 2 && r["result"]["isError"] == false));
}
