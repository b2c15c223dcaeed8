//! Error types and handling for chip

use thiserror::Error;

/// Result type alias for chip operations
pub type Result<T> = std::result::Result<T, ChipError>;

/// Main error type for chip
#[derive(Error, Debug)]
pub enum ChipError {
    /// Configuration errors (fatal at start-up)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A tool with the same name is already registered
    #[error("Tool '{name}' is already registered")]
    DuplicateTool { name: String },

    /// No active tool with the requested name
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Both enabled and disabled tool lists were supplied
    #[error("Cannot specify both enabled tools ({enabled}) and disabled tools ({disabled}), only one can be specified")]
    ConflictingFilter { enabled: usize, disabled: usize },

    /// A tool handler failed; the underlying failure is kept as the source
    #[error("Tool execution error: {tool_name}: {source}")]
    ToolExecution {
        tool_name: String,
        #[source]
        source: Box<ChipError>,
    },

    /// Tool input did not match the handler's expected shape
    #[error("Invalid tool input: {message}")]
    InvalidInput { message: String },

    /// A request context value was read before it was set
    #[error("Request context value '{key}' is not set")]
    MissingContextValue { key: &'static str },

    /// Outbound call attempted without a configured target base URL
    #[error("API URL is not configured")]
    MissingTargetConfiguration,

    /// The SSO browser could not be started or reached
    #[error("Failed to launch browser for SSO: {message}")]
    BrowserLaunch { message: String },

    /// The browser stopped responding to DevTools commands after launch
    #[error("Browser error: {message}")]
    Browser { message: String },

    /// No session cookie appeared before the deadline
    #[error("SSO authentication timed out after {timeout_secs}s without a session cookie, please try again")]
    SsoTimeout { timeout_secs: u64 },

    /// The SSO flow was cancelled by the caller
    #[error("SSO authentication was cancelled")]
    SsoCancelled,

    /// Credential cache could not be written or removed
    #[error("Session cache error: {message}")]
    Persistence { message: String },

    /// Operation exceeded its time budget
    #[error("Timeout: {message}")]
    Timeout { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors, passed through from the transport
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ChipError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a browser launch error
    pub fn browser_launch<S: Into<String>>(message: S) -> Self {
        Self::BrowserLaunch {
            message: message.into(),
        }
    }

    /// Create a browser protocol error
    pub fn browser<S: Into<String>>(message: S) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Wrap a handler failure with the name of the tool that produced it
    pub fn tool_execution<S: Into<String>>(tool_name: S, source: ChipError) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            source: Box::new(source),
        }
    }

    /// Whether the caller should be prompted to authenticate again
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ChipError::SsoTimeout { .. } | ChipError::SsoCancelled => true,
            ChipError::Http(e) => matches!(
                e.status(),
                Some(reqwest::StatusCode::UNAUTHORIZED) | Some(reqwest::StatusCode::FORBIDDEN)
            ),
            ChipError::ToolExecution { source, .. } => source.is_auth_failure(),
            _ => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ChipError::Config { .. } | ChipError::ConflictingFilter { .. } => "config",
            ChipError::DuplicateTool { .. } | ChipError::UnknownTool { .. } => "dispatch",
            ChipError::ToolExecution { .. } => "tool_execution",
            ChipError::InvalidInput { .. } => "validation",
            ChipError::MissingContextValue { .. } | ChipError::MissingTargetConfiguration => {
                "decoration"
            }
            ChipError::BrowserLaunch { .. }
            | ChipError::Browser { .. }
            | ChipError::SsoTimeout { .. }
            | ChipError::SsoCancelled => "auth",
            ChipError::Persistence { .. } => "persistence",
            ChipError::Timeout { .. } => "timeout",
            ChipError::Io(_) => "io",
            ChipError::Serde(_) => "serialization",
            ChipError::Yaml(_) => "yaml",
            ChipError::Http(_) => "http",
            ChipError::Internal(_) => "internal",
        }
    }
}
