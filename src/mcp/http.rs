//! HTTP transports for the MCP server
//!
//! Streamable HTTP takes one JSON-RPC message per `POST /mcp`. The legacy SSE
//! transport pairs a `GET /sse` event stream with `POST /message?sessionId=..`.
//! Both listen on localhost only. Headers of the inbound HTTP request become the
//! call's forwarded headers, so a client's `Authorization` reaches the decorator.

use crate::config::ServerMode;
use crate::error::{ChipError, Result};
use crate::mcp::errors::McpError;
use crate::mcp::server::{McpServer, TransportMeta};
use crate::mcp::types::{McpRequest, McpResponse};
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer};
use futures_util::{stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session header of the streamable HTTP transport
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const STREAMABLE_PATH: &str = "/mcp";
pub const SSE_PATH: &str = "/sse";
pub const SSE_MESSAGE_PATH: &str = "/message";

/// Shared state of the HTTP transports
pub struct HttpState {
    server: Arc<McpServer>,
    sse_sessions: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl HttpState {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sse_sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register an SSE session; events for it arrive on the returned receiver
    pub async fn open_sse_session(&self) -> (String, mpsc::UnboundedReceiver<String>) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.sse_sessions.lock().await.insert(session_id.clone(), tx);
        (session_id, rx)
    }

    pub async fn sse_session_count(&self) -> usize {
        self.sse_sessions.lock().await.len()
    }

    /// Push a response to an SSE session; a closed stream drops the session
    async fn deliver(&self, session_id: &str, response: &McpResponse) -> bool {
        let payload = match serde_json::to_string(response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                return true;
            }
        };

        let mut sessions = self.sse_sessions.lock().await;
        let Some(sender) = sessions.get(session_id) else {
            return false;
        };
        if sender.send(format!("event: message\ndata: {}\n\n", payload)).is_err() {
            debug!(session_id = %session_id, "SSE stream closed, dropping session");
            sessions.remove(session_id);
            return false;
        }
        true
    }
}

/// Register the routes of `mode` on an actix app
pub fn configure(cfg: &mut web::ServiceConfig, mode: ServerMode) {
    cfg.route("/health", web::get().to(health_check));
    match mode {
        ServerMode::HttpSse => {
            cfg.route(SSE_PATH, web::get().to(sse_handler))
                .route(SSE_MESSAGE_PATH, web::post().to(sse_message_handler));
        }
        _ => {
            cfg.route(STREAMABLE_PATH, web::post().to(streamable_http_handler));
        }
    }
}

/// Serve `mode` on `localhost:port` until `shutdown` fires
pub async fn run_http(
    server: Arc<McpServer>,
    mode: ServerMode,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = web::Data::new(HttpState::new(server));

    let http = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(|cfg| configure(cfg, mode))
    })
    .disable_signals()
    .bind(("127.0.0.1", port))
    .map_err(|e| ChipError::config(format!("Failed to bind localhost:{}: {}", port, e)))?
    .run();

    warn!("HTTP server is only listening on localhost for security reasons.");
    info!("Listening on localhost:{} ({} mode)", port, mode);

    let handle = http.handle();
    tokio::select! {
        result = http => result?,
        _ = shutdown.cancelled() => {
            info!("Stopping HTTP server");
            handle.stop(true).await;
        }
    }
    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "name": crate::SERVER_NAME,
        "version": crate::VERSION
    }))
}

async fn streamable_http_handler(
    req: HttpRequest,
    body: Bytes,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let request: McpRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return HttpResponse::BadRequest().json(McpResponse::error(
                None,
                McpError::parse_error(format!("Invalid JSON: {}", e)),
            ));
        }
    };

    let transport = transport_meta(&req);
    // A new session id is minted on initialize and echoed on every reply
    let session_id = if request.method == "initialize" {
        Some(
            transport
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        )
    } else {
        transport.session_id.clone()
    };

    match state.server.handle_request_with(request, &transport).await {
        Some(response) => {
            let mut builder = HttpResponse::Ok();
            if let Some(session_id) = session_id {
                builder.insert_header((SESSION_HEADER, session_id));
            }
            builder.json(response)
        }
        None => HttpResponse::Accepted().finish(),
    }
}

async fn sse_handler(state: web::Data<HttpState>) -> HttpResponse {
    let (session_id, rx) = state.open_sse_session().await;
    info!(session_id = %session_id, "SSE connection established");

    let endpoint = format!(
        "event: endpoint\ndata: {}?sessionId={}\n\n",
        SSE_MESSAGE_PATH, session_id
    );
    let events = stream::once(async move { endpoint })
        .chain(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
        .map(|event| Ok::<Bytes, actix_web::Error>(Bytes::from(event)));

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn sse_message_handler(
    req: HttpRequest,
    query: web::Query<MessageQuery>,
    body: Bytes,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let session_id = query.into_inner().session_id;
    if !state.sse_sessions.lock().await.contains_key(&session_id) {
        return HttpResponse::NotFound().json(json!({ "error": "Unknown SSE session" }));
    }

    let response = match serde_json::from_slice::<McpRequest>(&body) {
        Ok(request) => {
            let mut transport = transport_meta(&req);
            transport.session_id.get_or_insert_with(|| session_id.clone());
            state.server.handle_request_with(request, &transport).await
        }
        Err(e) => Some(McpResponse::error(
            None,
            McpError::parse_error(format!("Invalid JSON: {}", e)),
        )),
    };

    if let Some(response) = response {
        if !state.deliver(&session_id, &response).await {
            return HttpResponse::Gone().json(json!({ "error": "SSE stream closed" }));
        }
    }
    HttpResponse::Accepted().finish()
}

/// Caller metadata from the inbound HTTP request
fn transport_meta(req: &HttpRequest) -> TransportMeta {
    let mut headers = HeaderMap::new();
    for (name, value) in req.headers().iter() {
        match (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!("Skipping inbound header '{}'", name),
        }
    }

    let session_id = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|id| !id.is_empty());

    TransportMeta {
        session_id,
        headers,
    }
}
