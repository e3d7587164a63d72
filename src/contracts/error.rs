use std::fmt;

use crate::error::ErrorKind;

/// Error crossing a module boundary.
///
/// Opaque by construction: callers see a stable [`ErrorKind`], a message
/// and optionally the kind of the failure it wraps, never the inner error
/// type of the module that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    kind: ErrorKind,
    message: String,
    cause: Option<ErrorKind>,
    retry_after: Option<u64>,
}

impl ContractError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            retry_after: None,
        }
    }

    /// Re-labels `inner` as `kind`, keeping the original kind as the cause.
    pub fn wrap(kind: ErrorKind, inner: ContractError) -> Self {
        Self {
            kind,
            cause: Some(inner.cause.unwrap_or(inner.kind)),
            message: inner.message,
            retry_after: inner.retry_after,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn cause(&self) -> Option<ErrorKind> {
        self.cause
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// The innermost kind: the cause when wrapped, otherwise the kind.
    pub fn root_kind(&self) -> ErrorKind {
        self.cause.unwrap_or(self.kind)
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            Some(cause) => write!(f, "{} ({}): {}", self.kind, cause, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ContractError {}
