use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by decoding, file handling, and backend setup.
///
/// Kernels themselves are infallible; everything here is raised during
/// validation, I/O, or accelerator initialization. `Read` and `Write` are
/// recoverable per-sequence in many-files mode; the rest abort the call.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Input array extents disagree.
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        got: String,
    },

    /// A sequence with zero frames was submitted for decoding.
    #[error("cannot decode an empty sequence")]
    EmptySequence,

    /// Per-file load failure.
    #[error("read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// Per-file save failure.
    #[error("write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// The requested accelerator cannot be used.
    #[error("accelerator {device} unavailable: {reason}")]
    BackendUnavailable { device: usize, reason: String },

    /// NaN or +inf in a probability array after log conversion.
    #[error("invalid probability at frame {frame}, state {state}")]
    NumericInvalid { frame: usize, state: usize },
}

impl DecodeError {
    pub(crate) fn read(path: &std::path::Path, message: impl ToString) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(path: &std::path::Path, message: impl ToString) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}
