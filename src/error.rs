use thiserror::Error;

#[derive(Error, Debug)]
pub enum SslcountError {
    #[error("Failed to remove locked memory limit: {0}")]
    MemlockLimit(std::io::Error),

    #[error("Failed to load eBPF program: {0}")]
    ProgramLoadFailed(String),

    #[error("Failed to attach eBPF program: {0}")]
    AttachFailed(String),

    #[error("Target executable not found: {path}")]
    TargetNotFound { path: String },

    #[error("Counting table {0} not found")]
    TableNotFound(String),

    #[error("Failed to connect to agent at {endpoint}: {reason}")]
    AgentConnect { endpoint: String, reason: String },

    #[error("Agent {operation} request failed: {reason}")]
    AgentRequest { operation: String, reason: String },

    #[error("{field} not returned in {message}")]
    MissingResponseField {
        field: &'static str,
        message: &'static str,
    },

    #[error("Failed to resolve pin path: {0}")]
    PinPath(String),

    #[error("Invalid host pid {value:?}: {reason}")]
    InvalidHostPid { value: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to release {resource}: {reason}")]
    CloseFailed { resource: String, reason: String },

    #[error("Iterating table {table} failed: {reason}")]
    Iteration { table: String, reason: String },
}

impl SslcountError {
    /// Whether this error belongs to setup, where it is always fatal.
    pub fn is_setup_failure(&self) -> bool {
        !matches!(
            self,
            SslcountError::CloseFailed { .. } | SslcountError::Iteration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SslcountError>;
