//! Error types for symmetric tensor operations.

use thiserror::Error;

use crate::qnum::Qnum;
use crate::scalar::ScalarKind;

/// Error type for symmetric tensor operations.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Bonds are incompatible for contraction, tracing or addition.
    #[error("incompatible bonds: {0}")]
    BondMismatch(String),

    /// Shape mismatch in an operation.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Duplicate labels, wrong label count, or an unknown label.
    #[error("label error: {0}")]
    LabelError(String),

    /// A non-zero element sits at a charge-forbidden position.
    #[error("symmetry violation: non-zero element ({value:e}) at raw index {index}")]
    SymmetryViolation { index: usize, value: f64 },

    /// No block exists for the given charge.
    #[error("no block with charge {0}")]
    BlockNotFound(Qnum),

    /// Real/complex element types mixed where not permitted.
    #[error("scalar kind mismatch: found {found:?}, requested {requested:?}")]
    ScalarKindMismatch {
        found: ScalarKind,
        requested: ScalarKind,
    },

    /// A tensor file is corrupt or truncated.
    #[error("malformed tensor file: {0}")]
    Format(String),

    /// The dense kernel backend failed.
    #[error("linear algebra backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for symmetric tensor operations.
pub type Result<T> = std::result::Result<T, TensorError>;
