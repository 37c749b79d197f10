use thiserror::Error;

/// Errors returned by bucket implementations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object was not found in the store
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// The backing store rejected or failed an operation
    #[error("storage {op} failed for '{path}': {message}")]
    Backend {
        op: &'static str,
        path: String,
        message: String,
    },

    /// The store could not be configured
    #[error("invalid object store configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        StorageError::NotFound { path: path.into() }
    }

    pub fn backend(op: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Backend {
            op,
            path: path.into(),
            message: message.into(),
        }
    }

    /// True if this error means the object doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
