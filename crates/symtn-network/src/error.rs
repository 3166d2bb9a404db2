//! Error types for network construction and execution.

use thiserror::Error;

use symtn_core::TensorError;

/// Error type for network operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// `launch` was called before every leaf was bound.
    #[error("tensor '{0}' is not bound")]
    UnboundTensor(String),

    /// Unmatched labels or a malformed network spec.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// A rebind offered a tensor with a different bond signature.
    #[error("bond signature mismatch for tensor '{0}'")]
    ShapeMismatch(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
