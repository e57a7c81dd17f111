//! Error types for the agent supervisor

use thiserror::Error;

/// JSON-RPC error codes
///
/// Standard JSON-RPC codes plus supervisor-specific ones used when answering
/// requests coming from an agent subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Standard JSON-RPC errors (-32xxx)
    /// Parse error: Invalid JSON
    ParseError = -32700,
    /// Invalid request: Not a valid request object
    InvalidRequest = -32600,
    /// Method not found
    MethodNotFound = -32601,
    /// Invalid params
    InvalidParams = -32602,
    /// Internal error
    InternalError = -32603,

    // Supervisor errors (-32000 to -32099)
    /// Session not found
    SessionNotFound = -32001,
    /// Session already exists
    SessionAlreadyExists = -32002,
    /// Agent process is not running
    NotAlive = -32003,
    /// Operation cancelled
    Cancelled = -32006,
    /// Connection failed
    ConnectionFailed = -32007,
    /// Content could not be represented by the backend
    UnsupportedContent = -32008,
    /// Configuration error
    ConfigError = -32010,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for the supervisor
#[derive(Debug, Error)]
pub enum AgentError {
    // === Session errors ===
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session already exists
    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    /// The agent subprocess is not running
    #[error("Agent is not running")]
    NotAlive,

    // === Transport errors ===
    /// Spawning the agent subprocess failed
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed while a call was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timed out waiting for the agent
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    // === Protocol errors ===
    /// The agent answered with a JSON-RPC error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The agent answered a control request with an error
    #[error("Control request failed: {0}")]
    ControlFailed(String),

    /// Unexpected message shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Content errors ===
    /// Empty prompt
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    /// Content the backend cannot represent
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    // === Configuration errors ===
    /// Invalid permission mode
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for the supervisor
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Get the JSON-RPC error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AgentError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            AgentError::SessionAlreadyExists(_) => ErrorCode::SessionAlreadyExists,
            AgentError::NotAlive => ErrorCode::NotAlive,
            AgentError::SpawnFailed { .. } => ErrorCode::ConnectionFailed,
            AgentError::ConnectionFailed(_) => ErrorCode::ConnectionFailed,
            AgentError::ConnectionClosed => ErrorCode::ConnectionFailed,
            AgentError::Timeout(_) => ErrorCode::ConnectionFailed,
            AgentError::Rpc { .. } => ErrorCode::InternalError,
            AgentError::ControlFailed(_) => ErrorCode::InternalError,
            AgentError::Protocol(_) => ErrorCode::InvalidRequest,
            AgentError::EmptyPrompt => ErrorCode::InvalidParams,
            AgentError::UnsupportedContent(_) => ErrorCode::UnsupportedContent,
            AgentError::InvalidMode(_) => ErrorCode::InvalidParams,
            AgentError::ConfigError(_) => ErrorCode::ConfigError,
            AgentError::Io(_) => ErrorCode::InternalError,
            AgentError::Json(_) => ErrorCode::ParseError,
            AgentError::Internal(_) => ErrorCode::InternalError,
            AgentError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ConnectionFailed(_)
                | AgentError::ConnectionClosed
                | AgentError::Timeout(_)
                | AgentError::SpawnFailed { .. }
        )
    }

    /// Check if this error is a client error (caused by invalid input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AgentError::SessionNotFound(_)
                | AgentError::SessionAlreadyExists(_)
                | AgentError::EmptyPrompt
                | AgentError::UnsupportedContent(_)
                | AgentError::InvalidMode(_)
        )
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        AgentError::Internal(msg.into())
    }

    /// Create a session not found error
    pub fn session_not_found(key: impl Into<String>) -> Self {
        AgentError::SessionNotFound(key.into())
    }

    /// Create a spawn failure
    pub fn spawn_failed(program: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::SpawnFailed {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        AgentError::ConnectionFailed(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        AgentError::Protocol(msg.into())
    }

    /// Create an invalid mode error
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        AgentError::InvalidMode(mode.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        AgentError::ConfigError(msg.into())
    }
}
