//! Middleware system for tool dispatch with logging and context enrichment
//!
//! Every middleware wraps the next handler. The chain is composed once per tool at
//! registration time: the first middleware added is the outermost, so its
//! pre-logic runs first and its post-logic runs last.

use crate::error::Result;
use crate::routing::context::RequestContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A callable that turns tool input into tool output
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value>;
}

/// One-shot continuation handed to a middleware
///
/// `run` consumes the continuation, so a middleware can invoke the rest of the
/// chain at most once per call. Dropping it without running short-circuits.
pub struct Next {
    handler: Arc<dyn ToolHandler>,
}

impl Next {
    fn new(handler: Arc<dyn ToolHandler>) -> Self {
        Self { handler }
    }

    /// Invoke the rest of the chain
    pub async fn run(self, ctx: RequestContext, input: Value) -> Result<Value> {
        self.handler.call(ctx, input).await
    }
}

/// Trait for dispatch middleware
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handle a call; decide whether and when to invoke `next`
    async fn handle(&self, ctx: RequestContext, input: Value, next: Next) -> Result<Value>;
}

/// A handler decorated by one middleware
struct Wrapped {
    middleware: Arc<dyn ToolMiddleware>,
    inner: Arc<dyn ToolHandler>,
}

#[async_trait]
impl ToolHandler for Wrapped {
    async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value> {
        self.middleware
            .handle(ctx, input, Next::new(Arc::clone(&self.inner)))
            .await
    }
}

/// Ordered middleware list, outermost first
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; it runs inside every middleware added before it
    pub fn add_middleware(mut self, middleware: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Number of middleware in the chain
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Middleware names in composition order
    pub fn names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Compose the chain around a base handler into one effective handler
    pub fn compose(&self, base: Arc<dyn ToolHandler>) -> Arc<dyn ToolHandler> {
        self.middleware.iter().rev().fold(base, |inner, middleware| {
            Arc::new(Wrapped {
                middleware: Arc::clone(middleware),
                inner,
            })
        })
    }
}

/// Sets the configured target host on the context before continuing
pub struct TargetHostMiddleware {
    host: String,
}

impl TargetHostMiddleware {
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl ToolMiddleware for TargetHostMiddleware {
    fn name(&self) -> &str {
        "target_host"
    }

    async fn handle(&self, ctx: RequestContext, input: Value, next: Next) -> Result<Value> {
        next.run(ctx.with_host(self.host.as_str()), input).await
    }
}

/// Logging middleware that logs every tool call
pub struct LoggingMiddleware {
    /// Whether to log tool arguments
    pub log_data: bool,
    /// Whether to log timing information
    pub log_timing: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings
    pub fn new() -> Self {
        Self {
            log_data: false,
            log_timing: true,
        }
    }

    /// Create a logging middleware with custom settings
    pub fn with_config(log_data: bool, log_timing: bool) -> Self {
        Self {
            log_data,
            log_timing,
        }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, ctx: RequestContext, input: Value, next: Next) -> Result<Value> {
        let tool_name = ctx
            .envelope()
            .map(|e| e.name.clone())
            .unwrap_or_default();
        let session_id = ctx.session_id().map(str::to_string).unwrap_or_default();

        if self.log_data {
            debug!(
                tool_name = %tool_name,
                session_id = %session_id,
                arguments = %input,
                "Starting tool execution"
            );
        } else {
            debug!(tool_name = %tool_name, session_id = %session_id, "Starting tool execution");
        }

        let start = Instant::now();
        let result = next.run(ctx, input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) if self.log_timing => info!(
                tool_name = %tool_name,
                session_id = %session_id,
                duration_ms = duration_ms,
                "Tool execution completed successfully"
            ),
            Ok(_) => info!(
                tool_name = %tool_name,
                session_id = %session_id,
                "Tool execution completed successfully"
            ),
            Err(e) => warn!(
                tool_name = %tool_name,
                session_id = %session_id,
                duration_ms = duration_ms,
                error = %e,
                error_category = e.category(),
                auth_failure = e.is_auth_failure(),
                "Tool execution failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, ctx: RequestContext, input: Value) -> Result<Value> {
            Ok(json!({ "input": input, "host": ctx.host().ok() }))
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let handler = MiddlewareChain::new().compose(Arc::new(Echo));
        let output = handler.call(RequestContext::new(), json!(1)).await.unwrap();
        assert_eq!(output, json!({ "input": 1, "host": null }));
    }

    #[tokio::test]
    async fn test_target_host_middleware_enriches_context() {
        let chain = MiddlewareChain::new()
            .add_middleware(Arc::new(TargetHostMiddleware::new("https://acme.collibra.com")));
        let handler = chain.compose(Arc::new(Echo));

        let output = handler.call(RequestContext::new(), json!("x")).await.unwrap();
        assert_eq!(output["host"], "https://acme.collibra.com");
    }

    #[test]
    fn test_chain_names_in_order() {
        let chain = MiddlewareChain::new()
            .add_middleware(Arc::new(TargetHostMiddleware::new("h")))
            .add_middleware(Arc::new(LoggingMiddleware::new()));
        assert_eq!(chain.names(), vec!["target_host", "logging"]);
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
    }
}
