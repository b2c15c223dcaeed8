//! Tool dispatch: per-call context, middleware chain and the tool registry
//!
//! Every inbound call enters through [`ToolDispatcher::dispatch`], runs through
//! the middleware chain composed at registration time, and reaches the tool
//! handler with its own [`RequestContext`].

pub mod context;
pub mod dispatcher;
pub mod middleware;

pub use context::{RequestContext, ToolCallEnvelope, TransportSession};
pub use dispatcher::{ToolDescriptor, ToolDispatcher, ToolFilter};
pub use middleware::{
    LoggingMiddleware, MiddlewareChain, Next, TargetHostMiddleware, ToolHandler, ToolMiddleware,
};
