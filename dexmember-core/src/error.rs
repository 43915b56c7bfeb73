//! Typed error handling for dexmember.
//!
//! Every failure the extraction pipeline can surface is one of these variants.
//! Decode and desugar failures are permanent for the input that caused them
//! and abort the whole aggregation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dexmember operations.
#[derive(Error, Debug)]
pub enum DexMemberError {
    /// Input bytes are not a recognized or valid container
    #[error("Decode error in {source_name}: {message}")]
    Decode {
        /// Name of the artifact or archive entry being decoded
        source_name: String,
        message: String,
    },

    /// The desugaring toolchain failed
    #[error("Desugar error: {message}")]
    Desugar { message: String },

    /// I/O error when reading inputs, library archives or scratch files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Malformed mapping file
    #[error("Mapping error on line {line}: {message}")]
    Mapping { line: usize, message: String },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl DexMemberError {
    /// Create a decode error for the named artifact.
    pub fn decode(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a desugar error.
    pub fn desugar(message: impl Into<String>) -> Self {
        Self::Desugar {
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a mapping error at a 1-indexed line.
    pub fn mapping(line: usize, message: impl Into<String>) -> Self {
        Self::Mapping {
            line,
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error was caused by the input bytes themselves.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Convenience type alias for dexmember results.
pub type DexMemberResult<T> = Result<T, DexMemberError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> DexMemberResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> DexMemberResult<T> {
        self.map_err(|e| DexMemberError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error() {
        let err = DexMemberError::io(
            PathBuf::from("/test/classes.dex"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, DexMemberError::Io { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/test/classes.dex")));
        assert!(err.to_string().contains("/test/classes.dex"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DexMemberError::decode("app.apk!classes2.dex", "bad magic");
        assert_eq!(
            err.to_string(),
            "Decode error in app.apk!classes2.dex: bad magic"
        );
        assert!(err.is_input_error());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_is_input_error() {
        assert!(!DexMemberError::desugar("d8 exited with 1").is_input_error());
        assert!(!DexMemberError::mapping(3, "missing arrow").is_input_error());
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let converted = result.with_path("/missing/app.apk");
        assert!(matches!(converted, Err(DexMemberError::Io { .. })));
    }
}
