//! Error types for gridder configuration and input validation.
//!
//! Every error is detected at an API boundary (construction, `set_kernel`,
//! start of `grid`) and returned immediately. The accumulation loop itself
//! has no failure modes.

use thiserror::Error;

/// Errors raised by gridder construction, configuration and gridding.
#[derive(Debug, Clone, Error)]
pub enum GridError {
    /// Input arrays violate the dimensional preconditions of `grid`.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Requested output precision is not in the recognized set.
    #[error("invalid dtype \"{0}\": expected \"float32\" or \"float64\"")]
    InvalidDtype(String),

    /// `grid` was called before `set_kernel`.
    #[error("no kernel set: call set_kernel() before grid()")]
    KernelNotSet,

    /// Kernel name is not in the closed registry.
    #[error("unknown kernel \"{0}\"")]
    UnknownKernel(String),

    /// Kernel parameters do not match the selected kernel.
    #[error("kernel \"{kind}\": expected {expected}, got {got}")]
    ArityMismatch {
        kind: &'static str,
        expected: &'static str,
        got: String,
    },

    /// Pre-allocated buffer shape disagrees with the target geometry.
    #[error("geometry mismatch: {0}")]
    GeometryError(String),

    /// The worker thread pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),
}
