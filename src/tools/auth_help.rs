//! `auth_help`: re-authentication instructions for the calling agent

use crate::error::Result;
use crate::routing::{RequestContext, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const NAME: &str = "auth_help";

const DESCRIPTION: &str = "Get authentication help and instructions for the Collibra MCP server.

WHEN TO USE THIS TOOL:
- When you receive HTTP 401 (Unauthorized) or 403 (Forbidden) errors from other Collibra tools
- When the user asks about authentication or login issues
- When any Collibra tool returns an authentication-related error

Returns step-by-step instructions for restoring a valid session.";

const UNKNOWN_HOST: &str = "<your Collibra URL>";

/// No input
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthHelpInput {}

#[derive(Debug, Serialize)]
pub struct AuthHelpOutput {
    /// Step-by-step instructions for authenticating
    pub instructions: String,
    /// Current authentication status
    pub status: String,
}

/// Build the tool; `configured_host` is used when the call context carries no host
pub fn tool(configured_host: Option<String>) -> ToolDescriptor {
    ToolDescriptor::new(NAME, DESCRIPTION, move |ctx: RequestContext, _input: AuthHelpInput| {
        let host = ctx
            .host()
            .map(str::to_string)
            .ok()
            .or_else(|| configured_host.clone())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());
        async move { handle(&host) }
    })
    .with_input_schema(json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    }))
}

fn handle(host: &str) -> Result<AuthHelpOutput> {
    let executable = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| crate::SERVER_NAME.to_string());

    Ok(AuthHelpOutput {
        instructions: instructions(&executable, host),
        status: "Authentication help requested - please follow the instructions above".to_string(),
    })
}

fn instructions(executable: &str, host: &str) -> String {
    format!(
        r#"AUTHENTICATION REQUIRED - AI AGENT INSTRUCTIONS
================================================

You (the AI agent) must perform the following steps to authenticate with Collibra.
Do NOT just tell the user these instructions - YOU must execute them.

STEP 1: RUN THE AUTHENTICATION COMMAND
--------------------------------------
Run this command in a terminal as a BACKGROUND process so you are not blocked waiting for it:

    {executable} --api-url "{host}" --sso-auth

STEP 2: TELL THE USER WHAT TO DO
--------------------------------
After running the command, immediately tell the user:

"I've opened a browser window for Collibra authentication. Please log in to
{host} there. The window closes by itself once the login is complete.
Let me know when you're done and I'll retry."

STEP 3: WAIT FOR USER CONFIRMATION
----------------------------------
Wait for the user to confirm before retrying any Collibra operations.
The session is cached automatically for future use.
"#
    )
}
