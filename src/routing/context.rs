//! Per-call request context
//!
//! A [`RequestContext`] is created for every inbound tool call and handed down the
//! middleware chain by value. It never outlives the call and is never shared
//! between concurrent calls; the `with_*` builders return a new context and leave
//! the original untouched.

use crate::error::{ChipError, Result};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// The inbound "call this tool" request as received from the MCP client
#[derive(Debug, Clone)]
pub struct ToolCallEnvelope {
    /// Tool name to call
    pub name: String,
    /// Arguments for the tool
    pub arguments: Value,
    /// Session id supplied by the caller, if any
    pub caller_session_id: Option<String>,
    /// Headers forwarded by the caller (notably `Authorization`)
    pub forwarded_headers: HeaderMap,
}

impl ToolCallEnvelope {
    /// Create an envelope without caller metadata
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            caller_session_id: None,
            forwarded_headers: HeaderMap::new(),
        }
    }

    /// Attach a caller-supplied session id
    pub fn with_caller_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.caller_session_id = Some(session_id.into());
        self
    }

    /// Attach headers forwarded by the caller
    pub fn with_forwarded_headers(mut self, headers: HeaderMap) -> Self {
        self.forwarded_headers = headers;
        self
    }
}

/// One underlying client connection; mints the fallback session id once
#[derive(Debug, Clone)]
pub struct TransportSession {
    id: String,
}

impl TransportSession {
    /// Start a transport session with a fresh random id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Session id minted for this transport session
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for TransportSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Ambient values for one tool call
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    envelope: Option<Arc<ToolCallEnvelope>>,
    host: Option<String>,
    transport_session_id: Option<String>,
}

impl RequestContext {
    /// An empty context; every accessor fails until the value is set
    pub fn new() -> Self {
        Self::default()
    }

    /// A base context bound to one transport session
    pub fn for_transport(session: &TransportSession) -> Self {
        Self {
            transport_session_id: Some(session.id().to_string()),
            ..Self::default()
        }
    }

    /// New context carrying the target host
    pub fn with_host<S: Into<String>>(&self, host: S) -> Self {
        Self {
            host: Some(host.into()),
            ..self.clone()
        }
    }

    /// New context carrying the inbound envelope
    pub fn with_envelope(&self, envelope: ToolCallEnvelope) -> Self {
        Self {
            envelope: Some(Arc::new(envelope)),
            ..self.clone()
        }
    }

    /// New context bound to a transport session id
    pub fn with_transport_session_id<S: Into<String>>(&self, session_id: S) -> Self {
        Self {
            transport_session_id: Some(session_id.into()),
            ..self.clone()
        }
    }

    /// Target host set by middleware
    pub fn host(&self) -> Result<&str> {
        self.host
            .as_deref()
            .ok_or(ChipError::MissingContextValue { key: "host" })
    }

    /// Inbound envelope of the current call
    pub fn envelope(&self) -> Result<&ToolCallEnvelope> {
        self.envelope
            .as_deref()
            .ok_or(ChipError::MissingContextValue { key: "envelope" })
    }

    /// Session id of the current call
    ///
    /// A non-empty caller-supplied id on the envelope wins; otherwise the id minted
    /// for the transport session is used.
    pub fn session_id(&self) -> Result<&str> {
        self.envelope
            .as_deref()
            .and_then(|e| e.caller_session_id.as_deref())
            .filter(|id| !id.is_empty())
            .or(self.transport_session_id.as_deref())
            .ok_or(ChipError::MissingContextValue { key: "session_id" })
    }

    /// Whether a session id can be derived
    pub fn has_session_id(&self) -> bool {
        self.session_id().is_ok()
    }
}
