//! Engine errors
//!
//! One enum for everything the container codec and session manager can
//! report. Persistence failures keep their `StorageError` detail; failures
//! during `open` are wrapped in `OpenFailed` so callers can tell a failed
//! transition from a failed operation on an open session.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required member is missing or unreadable, or the manifest is invalid
    #[error("Malformed container '{path}': {details}")]
    MalformedContainer { path: PathBuf, details: String },

    /// The manifest declares a format version newer than this build understands
    #[error("Container '{path}' uses format version {found}, newer than supported version {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: String,
        supported: String,
    },

    /// Importing would overwrite an existing container
    #[error("Container '{path}' already exists; refusing to overwrite it")]
    DestinationExists { path: PathBuf },

    /// The path is neither a container nor a supported source document
    #[error("Unsupported file type '{path}': expected a .rr container or a .pdf document")]
    UnsupportedFileType { path: PathBuf },

    /// The caller supplied a value the engine cannot accept
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Underlying storage I/O or database failure
    #[error("Persistence error: {0}")]
    Persistence(StorageError),

    /// The operation needs an open document
    #[error("No document is open")]
    NoOpenSession,

    /// Opening a document failed; the engine is left with no open document
    #[error("Failed to open '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: Box<EngineError>,
    },
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPage { .. } | StorageError::InvalidPosition { .. } => {
                EngineError::InvalidInput(err.to_string())
            }
            other => EngineError::Persistence(other),
        }
    }
}

impl EngineError {
    /// Wrap an error raised while opening `path`
    pub fn open_failed(path: impl Into<PathBuf>, source: EngineError) -> Self {
        EngineError::OpenFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a `MalformedContainer` error
    pub fn malformed(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        EngineError::MalformedContainer {
            path: path.into(),
            details: details.into(),
        }
    }

    /// The innermost error, looking through `OpenFailed`
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::OpenFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            EngineError::Persistence(err) => err.recovery_suggestion(),
            EngineError::DestinationExists { .. } => {
                Some("Open the existing container instead, or move it aside before importing again.")
            }
            EngineError::UnsupportedVersion { .. } => {
                Some("This container was written by a newer release. Upgrade to open it.")
            }
            EngineError::NoOpenSession => Some("Open a document first."),
            EngineError::OpenFailed { source, .. } => source.recovery_suggestion(),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_page_becomes_invalid_input() {
        let err: EngineError = StorageError::InvalidPage { page: 0 }.into();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(err.to_string().contains("pages start at 1"));
    }

    #[test]
    fn test_invalid_position_becomes_invalid_input() {
        let err: EngineError = StorageError::InvalidPosition {
            details: "page_width must be a finite number, got NaN".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_storage_errors_become_persistence() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = StorageError::from_io(io_err, PathBuf::from("/x")).into();

        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_open_failed_root_cause() {
        let inner = EngineError::malformed("/docs/a.rr", "missing member 'manifest.json'");
        let err = EngineError::open_failed("/docs/a.rr", inner);

        assert!(matches!(
            err.root_cause(),
            EngineError::MalformedContainer { .. }
        ));
        let msg = err.to_string();
        assert!(msg.contains("Failed to open"));
        assert!(msg.contains("manifest.json"));
    }
}
