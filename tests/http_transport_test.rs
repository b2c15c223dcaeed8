//! Tests for the streamable HTTP and SSE transports

use actix_web::{test, web, App};
use chip::clients::ApiClient;
use chip::config::{ApiConfig, ServerMode};
use chip::error::ChipError;
use chip::mcp::http::{configure, HttpState, SESSION_HEADER};
use chip::mcp::McpServer;
use chip::routing::{MiddlewareChain, RequestContext, ToolDescriptor, ToolDispatcher};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Server with one tool that calls `GET /rest/2.0/assets` on `api_url`
fn server(api_url: &str) -> Arc<McpServer> {
    let config = ApiConfig {
        url: Some(api_url.to_string()),
        ..Default::default()
    };
    let client = Arc::new(ApiClient::from_config(&config).unwrap());

    let mut dispatcher = ToolDispatcher::new(MiddlewareChain::new());
    dispatcher
        .register(ToolDescriptor::new(
            "list_assets",
            "lists assets",
            move |ctx: RequestContext, _input: Value| {
                let client = Arc::clone(&client);
                async move {
                    let request = client.new_request(Method::GET, "/rest/2.0/assets")?;
                    let response = client.execute(&request, &ctx).await?;
                    Ok::<Value, ChipError>(json!({ "status": response.status().as_u16() }))
                }
            },
        ))
        .unwrap();

    Arc::new(McpServer::new(Arc::new(dispatcher)))
}

fn call(id: u64, tool: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": {} }
    })
}

#[actix_web::test]
async fn test_inbound_authorization_reaches_the_api() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/2.0/assets"))
        .and(header("authorization", "Bearer inbound-token"))
        .and(header("x-mcp-session-id", "client-session"))
        .and(header("x-mcp-tool-name", "list_assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&api)
        .await;

    let state = web::Data::new(HttpState::new(server(&api.uri())));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::HttpStreamable)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Authorization", "Bearer inbound-token"))
        .insert_header((SESSION_HEADER, "client-session"))
        .set_json(call(1, "list_assets"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["structuredContent"]["status"], 200);
}

#[actix_web::test]
async fn test_initialize_mints_a_session_id() {
    let state = web::Data::new(HttpState::new(server("https://acme.collibra.com")));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::Http)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .set_json(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let session_id = resp
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();
    assert!(!session_id.is_empty());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "chip");
}

#[actix_web::test]
async fn test_notification_is_accepted_without_body() {
    let state = web::Data::new(HttpState::new(server("https://acme.collibra.com")));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::HttpStreamable)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .set_json(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 202);
}

#[actix_web::test]
async fn test_invalid_json_is_a_parse_error() {
    let state = web::Data::new(HttpState::new(server("https://acme.collibra.com")));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::HttpStreamable)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], -32700);
}

#[actix_web::test]
async fn test_sse_message_is_delivered_on_the_stream() {
    let state = web::Data::new(HttpState::new(server("https://acme.collibra.com")));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::HttpSse)),
    )
    .await;

    let (session_id, mut events) = state.open_sse_session().await;
    let req = test::TestRequest::post()
        .uri(&format!("/message?sessionId={}", session_id))
        .set_json(json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 202);

    let event = events.recv().await.unwrap();
    assert!(event.starts_with("event: message\ndata: "));
    let payload: Value = serde_json::from_str(
        event
            .trim_start_matches("event: message\ndata: ")
            .trim_end(),
    )
    .unwrap();
    assert_eq!(payload["id"], 3);
    assert_eq!(payload["result"]["tools"][0]["name"], "list_assets");

    // A closed stream drops the session
    drop(events);
    let req = test::TestRequest::post()
        .uri(&format!("/message?sessionId={}", session_id))
        .set_json(json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 410);
    assert_eq!(state.sse_session_count().await, 0);
}

#[actix_web::test]
async fn test_sse_unknown_session_is_rejected() {
    let state = web::Data::new(HttpState::new(server("https://acme.collibra.com")));
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, ServerMode::HttpSse)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/message?sessionId=nope")
        .set_json(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
