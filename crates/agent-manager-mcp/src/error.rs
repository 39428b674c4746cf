use thiserror::Error;

/// Failures surfaced by catalog operations to tool callers.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("invalid agent content: {0}")]
    InvalidContent(String),
    #[error("agent already exists: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Errors a caller can fix by changing its request.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, CatalogError::Io(_))
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
