use thiserror::Error;

/// Errors raised by the dispatch layer and by command implementations.
///
/// Every variant carries a stable numeric code that ends up in the `code`
/// field of an error reply. `Custom` exists so that injected failures (fail
/// points) and forwarded errors keep their original code on the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Parse error: {0}")]
    FailedToParse(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("Unknown command: {0}")]
    CommandNotFound(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("API version error: {0}")]
    ApiVersionError(String),

    #[error("API deprecation error: {0}")]
    ApiDeprecationError(String),

    #[error("Operation not supported in transaction: {0}")]
    OperationNotSupportedInTransaction(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Operation was interrupted: {0}")]
    Interrupted(String),

    #[error("Client disconnected: {0}")]
    ClientDisconnect(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{1}")]
    Custom(i32, String),
}

impl DbError {
    /// The stable numeric code serialized into error replies.
    pub fn code(&self) -> i32 {
        match self {
            Self::Internal(_) => 1,
            Self::FailedToParse(_) => 9,
            Self::Unauthorized(_) => 13,
            Self::TypeMismatch(_) => 14,
            Self::IllegalOperation(_) => 20,
            Self::CommandNotFound(_) => 59,
            Self::InvalidOptions(_) => 72,
            Self::InvalidNamespace(_) => 73,
            Self::CommandFailed(_) => 125,
            Self::OperationNotSupportedInTransaction(_) => 263,
            Self::ClientDisconnect(_) => 279,
            Self::ApiVersionError(_) => 322,
            Self::ApiDeprecationError(_) => 323,
            Self::Interrupted(_) => 11601,
            Self::Custom(code, _) => *code,
        }
    }

    /// The human-readable part of the error, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::FailedToParse(m)
            | Self::TypeMismatch(m)
            | Self::Unauthorized(m)
            | Self::IllegalOperation(m)
            | Self::CommandNotFound(m)
            | Self::InvalidNamespace(m)
            | Self::InvalidOptions(m)
            | Self::ApiVersionError(m)
            | Self::ApiDeprecationError(m)
            | Self::OperationNotSupportedInTransaction(m)
            | Self::CommandFailed(m)
            | Self::Interrupted(m)
            | Self::ClientDisconnect(m)
            | Self::Internal(m)
            | Self::Custom(_, m) => m.clone(),
        }
    }

    /// An error with an arbitrary wire code, e.g. one injected by a fail
    /// point rule. Indistinguishable at the reply boundary from an organic
    /// error of the same code.
    pub fn custom(code: i32, message: impl Into<String>) -> Self {
        Self::Custom(code, message.into())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Internal(err.to_string())
    }
}
