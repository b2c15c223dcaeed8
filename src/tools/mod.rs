//! Tool catalog exposed to MCP clients

pub mod auth_help;

use crate::clients::ApiClient;
use crate::error::Result;
use crate::routing::{ToolDescriptor, ToolDispatcher, ToolFilter};
use std::sync::Arc;
use tracing::info;

/// Every tool the server ships, bound to the outbound API client
pub fn catalog(client: &Arc<ApiClient>) -> Vec<ToolDescriptor> {
    vec![auth_help::tool(client.target().map(|url| {
        url.as_str().trim_end_matches('/').to_string()
    }))]
}

/// Register the catalog and then apply `filter`
///
/// The filter is validated first, so a conflicting filter leaves the dispatcher empty.
pub fn register_all(
    dispatcher: &mut ToolDispatcher,
    client: Arc<ApiClient>,
    filter: &ToolFilter,
) -> Result<()> {
    filter.validate()?;

    for descriptor in catalog(&client) {
        dispatcher.register(descriptor)?;
    }
    dispatcher.apply_filter(filter)?;

    info!("Registered {} tools", dispatcher.len());
    Ok(())
}
