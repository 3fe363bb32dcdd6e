//! Error types for NormalMaker.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while editing layers, arrows and projects.
///
/// GPU failures are fatal for the current run; everything else fails the one
/// user action that triggered it and leaves the editor state untouched.
#[derive(Error, Debug)]
pub enum Error {
    /// A device call failed (validation, out-of-memory, lost device).
    #[error("GPU operation `{op}` failed: {reason}")]
    Gpu { op: &'static str, reason: String },

    /// No adapter (hardware or fallback) could be opened.
    #[error("no GPU adapter available")]
    NoAdapter,

    /// An image file could not be decoded.
    #[error("failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Encoding pixels to PNG failed.
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The project stream is truncated or carries out-of-range values.
    #[error("invalid project file: {0}")]
    InvalidProject(String),

    /// The arrow list is already mirrored at full GPU capacity.
    #[error("normal arrow capacity reached ({max} arrows)")]
    ArrowCapacity { max: usize },

    /// Export requested with no layers to composite.
    #[error("canvas has no layers to export")]
    EmptyCanvas,

    /// A texture handle outlived its texture.
    #[error("texture handle no longer refers to a live texture")]
    StaleTexture,
}

impl Error {
    pub fn gpu(op: &'static str, reason: impl ToString) -> Self {
        Error::Gpu {
            op,
            reason: reason.to_string(),
        }
    }

    /// Fatal errors end the session; the rest are reported and ignored.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Gpu { .. } | Error::NoAdapter)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_device_errors_are_fatal() {
        assert!(Error::gpu("paint", "lost").is_fatal());
        assert!(Error::NoAdapter.is_fatal());
        assert!(!Error::EmptyCanvas.is_fatal());
        assert!(!Error::ArrowCapacity { max: 256 }.is_fatal());
        assert!(!Error::InvalidProject("short".into()).is_fatal());
    }

    #[test]
    fn gpu_error_names_the_operation() {
        let msg = Error::gpu("combine", "out of memory").to_string();
        assert!(msg.contains("combine"));
        assert!(msg.contains("out of memory"));
    }
}
