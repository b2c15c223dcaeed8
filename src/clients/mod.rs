//! Outbound HTTP: the decorating API client and the transport it delegates to

pub mod api_client;
pub mod transport;

pub use api_client::{
    generate_traceparent, ApiClient, SESSION_ID_HEADER, TOOL_NAME_HEADER, TRACEPARENT_HEADER,
};
pub use transport::{build_http_client, HttpTransport};
