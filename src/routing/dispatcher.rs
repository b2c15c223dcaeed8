//! Tool registry and dispatch entry point

use crate::error::{ChipError, Result};
use crate::routing::context::{RequestContext, ToolCallEnvelope};
use crate::routing::middleware::{MiddlewareChain, ToolHandler};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// A named tool and its handler
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// Create a tool from a typed async handler
    ///
    /// Input is deserialized into `I` before the handler runs (a `null` input is
    /// read as `{}`); a mismatch fails with [`ChipError::InvalidInput`].
    pub fn new<I, O, F, Fut>(name: &str, description: &str, handler: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::from_handler(
            name,
            description,
            Arc::new(TypedHandler {
                handler,
                _marker: PhantomData,
            }),
        )
    }

    /// Create a tool from an untyped handler
    pub fn from_handler(name: &str, description: &str, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
            handler,
        }
    }

    /// Set the JSON schema advertised for the tool input
    pub fn with_input_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

struct TypedHandler<I, O, F> {
    handler: F,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<I, O, F, Fut> ToolHandler for TypedHandler<I, O, F>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + 'static,
    F: Fn(RequestContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value> {
        let input = if input.is_null() { json!({}) } else { input };
        let typed: I = serde_json::from_value(input)
            .map_err(|e| ChipError::invalid_input(e.to_string()))?;
        let output = (self.handler)(ctx, typed).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Which registered tools stay active
///
/// At most one of the two sets may be non-empty; an empty filter keeps every tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    enabled: HashSet<String>,
    disabled: HashSet<String>,
}

impl ToolFilter {
    pub fn new<E, D>(enabled: E, disabled: D) -> Self
    where
        E: IntoIterator<Item = String>,
        D: IntoIterator<Item = String>,
    {
        Self {
            enabled: enabled.into_iter().collect(),
            disabled: disabled.into_iter().collect(),
        }
    }

    /// Keep only the named tools
    pub fn enabled_only<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self::new(names, Vec::new())
    }

    /// Keep every tool except the named ones
    pub fn all_except<I: IntoIterator<Item = String>>(names: I) -> Self {
        Self::new(Vec::new(), names)
    }

    /// Fails when both sets are non-empty
    pub fn validate(&self) -> Result<()> {
        if !self.enabled.is_empty() && !self.disabled.is_empty() {
            return Err(ChipError::ConflictingFilter {
                enabled: self.enabled.len(),
                disabled: self.disabled.len(),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }

    /// Whether a tool with this name stays active
    pub fn is_active(&self, name: &str) -> bool {
        if !self.enabled.is_empty() {
            return self.enabled.contains(name);
        }
        !self.disabled.contains(name)
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    effective: Arc<dyn ToolHandler>,
}

/// Registry of named tools behind one middleware chain
///
/// Registration needs `&mut self` and happens at start-up; dispatch takes `&self`,
/// so a dispatcher behind an `Arc` serves concurrent calls without locking.
pub struct ToolDispatcher {
    tools: BTreeMap<String, RegisteredTool>,
    middleware: MiddlewareChain,
    call_timeout: Option<Duration>,
}

impl ToolDispatcher {
    /// Create a dispatcher; every tool registered later is wrapped by `middleware`
    pub fn new(middleware: MiddlewareChain) -> Self {
        Self {
            tools: BTreeMap::new(),
            middleware,
            call_timeout: None,
        }
    }

    /// Bound every call by a timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Register a tool, composing the middleware chain around its handler
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(descriptor.name()) {
            return Err(ChipError::DuplicateTool {
                name: descriptor.name().to_string(),
            });
        }

        let effective = self.middleware.compose(Arc::clone(&descriptor.handler));
        debug!(
            tool_name = %descriptor.name(),
            middleware = ?self.middleware.names(),
            "Registered tool"
        );
        self.tools.insert(
            descriptor.name().to_string(),
            RegisteredTool {
                descriptor,
                effective,
            },
        );
        Ok(())
    }

    /// Drop tools the filter deactivates; returns how many were removed
    ///
    /// A conflicting filter is rejected before the registry is touched.
    pub fn apply_filter(&mut self, filter: &ToolFilter) -> Result<usize> {
        filter.validate()?;
        if filter.is_empty() {
            return Ok(0);
        }

        let before = self.tools.len();
        self.tools.retain(|name, _| {
            let active = filter.is_active(name);
            if !active {
                debug!(tool_name = %name, "Tool disabled by filter");
            }
            active
        });
        let removed = before - self.tools.len();
        info!("Tool filter applied: {} active, {} disabled", self.tools.len(), removed);
        Ok(removed)
    }

    /// Descriptors of all active tools, ordered by name
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|t| &t.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one inbound call
    ///
    /// The per-call context is derived from `base`: an envelope is attached when the
    /// base has none, and a session id is minted when none can be derived. Handler
    /// failures, including timeouts, come back as [`ChipError::ToolExecution`].
    pub async fn dispatch(&self, name: &str, raw_input: Value, base: RequestContext) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| ChipError::UnknownTool {
            name: name.to_string(),
        })?;

        let mut ctx = match base.envelope() {
            Ok(_) => base,
            Err(_) => base.with_envelope(ToolCallEnvelope::new(name, raw_input.clone())),
        };
        if !ctx.has_session_id() {
            ctx = ctx.with_transport_session_id(Uuid::new_v4().to_string());
        }

        info!(
            tool_name = %name,
            session_id = %ctx.session_id().unwrap_or_default(),
            "Calling tool"
        );

        let call = tool.effective.call(ctx, raw_input);
        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(ChipError::timeout(format!(
                    "tool call exceeded {}s",
                    limit.as_secs_f64()
                ))),
            },
            None => call.await,
        };

        result.map_err(|e| ChipError::tool_execution(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_semantics() {
        let all = ToolFilter::default();
        assert!(all.is_active("anything"));

        let enabled = ToolFilter::enabled_only(vec!["a".to_string()]);
        assert!(enabled.is_active("a"));
        assert!(!enabled.is_active("b"));

        let disabled = ToolFilter::all_except(vec!["a".to_string()]);
        assert!(!disabled.is_active("a"));
        assert!(disabled.is_active("b"));
    }

    #[test]
    fn test_conflicting_filter() {
        let filter = ToolFilter::new(vec!["a".to_string()], vec!["b".to_string()]);
        assert!(matches!(
            filter.validate(),
            Err(ChipError::ConflictingFilter { enabled: 1, disabled: 1 })
        ));
    }
}
