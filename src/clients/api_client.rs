//! Outbound request decorator
//!
//! [`ApiClient`] sits between tool handlers and the real transport. Every outbound
//! request is cloned, authenticated, tagged with session/tool/trace headers and
//! re-targeted at the configured API before it is handed to the transport.
//! Anything that goes wrong before the hand-off aborts without network I/O; the
//! transport's response or error is returned untouched.

use crate::clients::transport::{build_http_client, HttpTransport};
use crate::config::ApiConfig;
use crate::error::{ChipError, Result};
use crate::routing::RequestContext;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::{Method, Request, Response};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Header carrying the MCP session id
pub const SESSION_ID_HEADER: &str = "x-mcp-session-id";
/// Header carrying the dispatched tool name
pub const TOOL_NAME_HEADER: &str = "x-mcp-tool-name";
/// W3C trace context header
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Origin used for requests built before decoration re-targets them
const PLACEHOLDER_ORIGIN: &str = "http://collibra.invalid";

/// Decorating client for calls to the target API
pub struct ApiClient {
    target: Option<Url>,
    basic_auth: Option<(String, SecretString)>,
    cookie: Option<SecretString>,
    next: Arc<dyn HttpTransport>,
}

impl ApiClient {
    /// Wrap an arbitrary transport
    pub fn new(config: &ApiConfig, next: Arc<dyn HttpTransport>) -> Result<Self> {
        let basic_auth = match (&config.username, &config.password) {
            (Some(username), Some(password)) if config.has_basic_auth() => {
                Some((username.clone(), password.clone()))
            }
            _ => None,
        };

        Ok(Self {
            target: config.target_url()?,
            basic_auth,
            cookie: config.cookie.clone(),
            next,
        })
    }

    /// Wrap a reqwest client built from the same configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let client = build_http_client(config)?;
        Self::new(config, Arc::new(client))
    }

    /// Configured target base URL
    pub fn target(&self) -> Option<&Url> {
        self.target.as_ref()
    }

    /// Build a request for an API path; decoration re-targets it
    pub fn new_request(&self, method: Method, path_and_query: &str) -> Result<Request> {
        let url = Url::parse(PLACEHOLDER_ORIGIN)
            .and_then(|origin| origin.join(path_and_query))
            .map_err(|e| ChipError::invalid_input(format!("Invalid API path '{}': {}", path_and_query, e)))?;
        Ok(Request::new(method, url))
    }

    /// Produce the decorated copy of `request`; the original is never mutated
    pub fn decorate(&self, request: &Request, ctx: &RequestContext) -> Result<Request> {
        let mut outbound = request.try_clone().ok_or_else(|| {
            ChipError::invalid_input("Outbound request body is a stream and cannot be cloned")
        })?;

        let target = self
            .target
            .as_ref()
            .ok_or(ChipError::MissingTargetConfiguration)?;

        self.apply_credentials(&mut outbound, ctx)?;

        let session_id = ctx.session_id()?;
        let tool_name = ctx.envelope()?.name.as_str();
        let headers = outbound.headers_mut();
        headers.insert(
            HeaderName::from_static(SESSION_ID_HEADER),
            header_value(session_id, SESSION_ID_HEADER)?,
        );
        headers.insert(
            HeaderName::from_static(TOOL_NAME_HEADER),
            header_value(tool_name, TOOL_NAME_HEADER)?,
        );
        headers.insert(
            HeaderName::from_static(TRACEPARENT_HEADER),
            header_value(&generate_traceparent(), TRACEPARENT_HEADER)?,
        );

        retarget(outbound.url_mut(), target, request.url().path())?;

        trace!(
            method = %outbound.method(),
            url = %outbound.url(),
            session_id = %session_id,
            tool_name = %tool_name,
            "Decorated outbound request"
        );
        Ok(outbound)
    }

    /// Decorate `request` and send it through the wrapped transport
    pub async fn execute(&self, request: &Request, ctx: &RequestContext) -> Result<Response> {
        let outbound = self.decorate(request, ctx)?;
        self.next.send(outbound).await
    }

    /// Fixed shared credentials win; otherwise the caller's Authorization is forwarded
    fn apply_credentials(&self, outbound: &mut Request, ctx: &RequestContext) -> Result<()> {
        let headers = outbound.headers_mut();

        if let Some((username, password)) = &self.basic_auth {
            let encoded = general_purpose::STANDARD
                .encode(format!("{}:{}", username, password.expose_secret()));
            let mut value = header_value(&format!("Basic {}", encoded), "authorization")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(cookie) = &self.cookie {
            let mut value = header_value(cookie.expose_secret(), "cookie")?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
            if self.basic_auth.is_none() {
                // The shared session replaces any per-call token
                headers.remove(AUTHORIZATION);
            }
        }

        if self.basic_auth.is_none() && self.cookie.is_none() {
            if let Ok(envelope) = ctx.envelope() {
                for value in envelope.forwarded_headers.get_all(AUTHORIZATION) {
                    headers.append(AUTHORIZATION, value.clone());
                }
            }
        }

        Ok(())
    }
}

fn header_value(value: &str, header: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ChipError::invalid_input(format!("Invalid value for header {}: {}", header, e)))
}

/// `00-<32 hex trace id>-<16 hex span id>-01`, always sampled
pub fn generate_traceparent() -> String {
    let mut trace_id = [0u8; 16];
    let mut span_id = [0u8; 8];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut trace_id);
    rng.fill_bytes(&mut span_id);
    format!("00-{}-{}-01", hex::encode(trace_id), hex::encode(span_id))
}

/// Point `url` at the target's scheme, host and port and prefix the target's base path
fn retarget(url: &mut Url, target: &Url, original_path: &str) -> Result<()> {
    let invalid = |what: &str| ChipError::config(format!("Cannot apply target {} from {}", what, target));

    url.set_scheme(target.scheme()).map_err(|_| invalid("scheme"))?;
    url.set_host(target.host_str()).map_err(|_| invalid("host"))?;
    url.set_port(target.port()).map_err(|_| invalid("port"))?;
    url.set_path(&join_paths(target.path(), original_path));
    Ok(())
}

/// Join a base path and a request path with exactly one slash between them
fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => base.to_string(),
        (true, false) => format!("/{}", path),
        (false, false) => format!("{}/{}", base, path),
    }
}
