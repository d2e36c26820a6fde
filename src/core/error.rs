//! Unified error handling for provisiond
//!
//! Every failure a provisioning run can hit is one variant of [`AgentError`].
//! All of them are terminal for the run that produced them.

use std::fmt;

/// Error taxonomy for the provisioning pipeline
#[derive(Debug)]
pub enum AgentError {
    /// Malformed inbound message or record
    Decode(String),

    /// Status token outside the lifecycle vocabulary
    InvalidRequestType(String),

    /// Missing store record
    NotFound { collection: String, id: String },

    /// Store unreachable or malformed response
    Store(String),

    /// Container runtime failure
    Provision { name: String, cause: String },

    /// Configuration errors
    Configuration(String),

    /// Repository plugin lookup or operation errors
    Repository(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Decode(msg) => write!(f, "Decode error: {msg}"),
            AgentError::InvalidRequestType(token) => {
                write!(f, "Invalid request type: {token:?}")
            }
            AgentError::NotFound { collection, id } => {
                write!(f, "Record not found: {collection}/{id}")
            }
            AgentError::Store(msg) => write!(f, "Store error: {msg}"),
            AgentError::Provision { name, cause } => {
                write!(f, "Provision error for container {name}: {cause}")
            }
            AgentError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            AgentError::Repository(msg) => write!(f, "Repository error: {msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<etcd_client::Error> for AgentError {
    fn from(err: etcd_client::Error) -> Self {
        AgentError::Store(err.to_string())
    }
}

impl AgentError {
    /// Short label used for log lines and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Decode(_) => "decode",
            AgentError::InvalidRequestType(_) => "invalid_request_type",
            AgentError::NotFound { .. } => "not_found",
            AgentError::Store(_) => "store",
            AgentError::Provision { .. } => "provision",
            AgentError::Configuration(_) => "configuration",
            AgentError::Repository(_) => "repository",
        }
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn store_context(self, context: &str) -> AgentResult<T>;
    fn decode_context(self, context: &str) -> AgentResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn store_context(self, context: &str) -> AgentResult<T> {
        self.map_err(|e| AgentError::Store(format!("{context}: {e}")))
    }

    fn decode_context(self, context: &str) -> AgentResult<T> {
        self.map_err(|e| AgentError::Decode(format!("{context}: {e}")))
    }
}
