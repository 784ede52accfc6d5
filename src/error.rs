//! Error types for the generation pipeline

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::pipeline::RunState;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run is not packaged (current state: {0})")]
    InvalidState(RunState),

    #[error("Module '{0}' is already being generated")]
    Busy(String),
}

/// Coarse error category a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Io,
    Archive,
    Serialization,
    InvalidState,
    Busy,
}

impl GeneratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Io { .. } => ErrorKind::Io,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }
}

/// A failed `generate()` run.
///
/// Carries the error that aborted the run and, separately, whether the
/// cleanup attempted afterwards removed everything. Cleanup status never
/// replaces the original error.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct GenerationFailure {
    #[source]
    pub error: GeneratorError,
    pub cleanup_succeeded: bool,
}

impl GenerationFailure {
    /// Failure raised before anything touched the filesystem.
    pub fn before_io(error: GeneratorError) -> Self {
        Self {
            error,
            cleanup_succeeded: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<GenerationFailure> for GeneratorError {
    fn from(failure: GenerationFailure) -> Self {
        failure.error
    }
}
