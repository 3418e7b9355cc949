use thiserror::Error;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from reading data or config files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Node data that could not be decoded.
    #[error("Malformed node data: {0}")]
    Json(#[from] serde_json::Error),

    /// A node key that is already present in the tree.
    #[error("Duplicate node key: {0}")]
    DuplicateKey(String),

    /// A data source failed to deliver children.
    #[error("Load failed: {0}")]
    Load(String),
}
