use model::error::BatchError;
use thiserror::Error;

/// Failures of a [`crate::fs::FileSystem`] backend.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    /// The path escapes the file system root or is otherwise unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Checksum sidecar holds no digest: {0}")]
    EmptySidecar(String),
}

impl FileError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return FileError::NotFound(path.into());
        }
        FileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn into_read(self) -> BatchError {
        BatchError::read_with("file read failed", self)
    }

    pub fn into_write(self) -> BatchError {
        BatchError::write_with("file write failed", self)
    }
}

impl From<FileError> for BatchError {
    fn from(err: FileError) -> Self {
        BatchError::file_transfer_with("file transfer failed", err)
    }
}
