//! Crate error types
//!
//! Validation and security failures are kept as distinct enums so that
//! security rejections can be audited separately from ordinary input
//! mistakes. `WardenError` is the crate-wide error that every public
//! operation returns.

use thiserror::Error;

/// Malformed or disallowed input, caught before any OS interaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Server name failed the identifier rules
    #[error("invalid server name '{name}': {reason}")]
    ServerName { name: String, reason: String },

    /// Command argument contained injection or traversal material
    #[error("unsafe command argument '{argument}': {reason}")]
    Argument { argument: String, reason: String },

    /// File path outside the allow-listed directory prefixes
    #[error("file path '{path}' is outside the allowed directories")]
    PathNotAllowed { path: String },

    /// File path contained a traversal sequence
    #[error("file path '{path}' contains a traversal sequence")]
    PathTraversal { path: String },

    /// Resource URI used a scheme outside the allow-list
    #[error("resource URI '{uri}' uses a disallowed scheme")]
    UriScheme { uri: String },

    /// Resource URI could not be parsed or carried an unsafe path
    #[error("resource URI '{uri}' is invalid: {reason}")]
    Uri { uri: String, reason: String },

    /// Stdio server config without a command
    #[error("stdio server '{name}' has no command")]
    MissingCommand { name: String },

    /// HTTP server config without a URL
    #[error("http server '{name}' has no http_url")]
    MissingHttpUrl { name: String },
}

/// Validation failure tied to command or path resolution
///
/// Messages name the rejected command/argument but never describe the
/// filesystem probing that led to the rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Command basename not on the allow-list
    #[error("command '{command}' is not an allowed command")]
    CommandNotAllowed { command: String },

    /// Bare command could not be resolved inside the allowed directories
    #[error("command '{command}' could not be resolved to an allowed executable")]
    CommandNotResolvable { command: String },

    /// Resolved file is not the executable the allow-list expects
    #[error("command '{command}' does not resolve to the expected executable")]
    ExecutableMismatch { command: String },

    /// Argument matched no allowed pattern for its command
    #[error("argument '{argument}' is not allowed for command '{command}'")]
    ArgumentNotAllowed { command: String, argument: String },

    /// HTTP server URL violated the transport policy
    #[error("server URL '{url}' is not allowed: {reason}")]
    UrlNotAllowed { url: String, reason: String },
}

/// Errors produced by the warden
#[derive(Error, Debug)]
pub enum WardenError {
    /// Malformed input rejected before any OS interaction
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Security rejection from command/path resolution
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Named-server operational failure (start/stop/discovery)
    #[error("server '{name}': {operation} failed: {reason}")]
    Server {
        name: String,
        operation: String,
        reason: String,
    },

    /// Transport-level failure reaching a server
    #[error("connection to server '{name}' failed: {reason}")]
    Connection { name: String, reason: String },

    /// A tool or resource call failed on an otherwise-healthy server
    #[error("tool '{tool}' on server '{server}' failed after {elapsed_ms}ms: {reason}")]
    Tool {
        server: String,
        tool: String,
        elapsed_ms: u64,
        reason: String,
    },

    /// A tool or resource call exceeded the server's timeout
    #[error("tool '{tool}' on server '{server}' timed out after {elapsed_ms}ms")]
    ToolTimeout {
        server: String,
        tool: String,
        elapsed_ms: u64,
    },

    /// Server is not registered
    #[error("server '{0}' not found")]
    ServerNotFound(String),

    /// Server name already registered
    #[error("server '{0}' already exists")]
    ServerExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WardenError {
    /// Create a server operation error
    pub fn server(
        name: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        WardenError::Server {
            name: name.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection(name: impl Into<String>, reason: impl Into<String>) -> Self {
        WardenError::Connection {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a security rejection (for audit logging)
    pub fn is_security(&self) -> bool {
        matches!(self, WardenError::Security(_))
    }
}

/// Result type alias for warden operations
pub type WardenResult<T> = Result<T, WardenError>;
