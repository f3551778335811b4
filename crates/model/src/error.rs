use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of a [`BatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Configuration,
    Read,
    Process,
    Write,
    Persistence,
    FileTransfer,
    ChecksumMismatch,
    Stopped,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Configuration => "CONFIGURATION",
            ErrorCode::Read => "READ",
            ErrorCode::Process => "PROCESS",
            ErrorCode::Write => "WRITE",
            ErrorCode::Persistence => "PERSISTENCE",
            ErrorCode::FileTransfer => "FILE_TRANSFER",
            ErrorCode::ChecksumMismatch => "CHECKSUM_MISMATCH",
            ErrorCode::Stopped => "STOPPED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type shared by the engine and every collaborator it calls.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Read failed: {message}")]
    Read {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Process failed: {message}")]
    Process {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Write failed: {message}")]
    Write {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Persistence failure: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("File transfer failed: {message}")]
    FileTransfer {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Execution stopped: {message}")]
    Stopped { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BatchError::Configuration { .. } => ErrorCode::Configuration,
            BatchError::Read { .. } => ErrorCode::Read,
            BatchError::Process { .. } => ErrorCode::Process,
            BatchError::Write { .. } => ErrorCode::Write,
            BatchError::Persistence { .. } => ErrorCode::Persistence,
            BatchError::FileTransfer { .. } => ErrorCode::FileTransfer,
            BatchError::ChecksumMismatch { .. } => ErrorCode::ChecksumMismatch,
            BatchError::Stopped { .. } => ErrorCode::Stopped,
            BatchError::Internal { .. } => ErrorCode::Internal,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        BatchError::Configuration {
            message: message.into(),
        }
    }

    pub fn read(message: impl Into<String>) -> Self {
        BatchError::Read {
            message: message.into(),
            source: None,
        }
    }

    pub fn read_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BatchError::Read {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        BatchError::Process {
            message: message.into(),
            source: None,
        }
    }

    pub fn process_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BatchError::Process {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        BatchError::Write {
            message: message.into(),
            source: None,
        }
    }

    pub fn write_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BatchError::Write {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        BatchError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn persistence_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BatchError::Persistence {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn file_transfer(message: impl Into<String>) -> Self {
        BatchError::FileTransfer {
            message: message.into(),
            source: None,
        }
    }

    pub fn file_transfer_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BatchError::FileTransfer {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn checksum_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        BatchError::ChecksumMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        BatchError::Stopped {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BatchError::Internal {
            message: message.into(),
        }
    }

    /// The message without the classification prefix.
    pub fn message(&self) -> String {
        match self {
            BatchError::Configuration { message }
            | BatchError::Read { message, .. }
            | BatchError::Process { message, .. }
            | BatchError::Write { message, .. }
            | BatchError::Persistence { message, .. }
            | BatchError::FileTransfer { message, .. }
            | BatchError::Stopped { message }
            | BatchError::Internal { message } => message.clone(),
            BatchError::ChecksumMismatch { .. } => self.to_string(),
        }
    }

    /// Serializable summary recorded on executions.
    pub fn detail(&self) -> FailureDetail {
        FailureDetail {
            code: self.code(),
            message: self.message(),
        }
    }
}

/// Error summary persisted alongside a failed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub code: ErrorCode,
    pub message: String,
}

impl FailureDetail {
    /// Rebuilds an error from a persisted detail. The original cause is not kept.
    pub fn to_error(&self) -> BatchError {
        let message = self.message.clone();
        match self.code {
            ErrorCode::Configuration => BatchError::configuration(message),
            ErrorCode::Read => BatchError::read(message),
            ErrorCode::Process => BatchError::process(message),
            ErrorCode::Write => BatchError::write(message),
            ErrorCode::Persistence => BatchError::persistence(message),
            ErrorCode::FileTransfer => BatchError::file_transfer(message),
            ErrorCode::ChecksumMismatch => BatchError::checksum_mismatch(message, "", ""),
            ErrorCode::Stopped => BatchError::stopped(message),
            ErrorCode::Internal => BatchError::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn keeps_code_and_cause() {
        let io = std::io::Error::other("disk gone");
        let err = BatchError::write_with("insert trade failed", io);

        assert_eq!(err.code(), ErrorCode::Write);
        assert_eq!(err.to_string(), "Write failed: insert trade failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));
    }

    #[test]
    fn detail_round_trips_code() {
        let err = BatchError::checksum_mismatch("trade.csv", "aa", "bb");
        let detail = err.detail();

        assert_eq!(detail.code, ErrorCode::ChecksumMismatch);
        assert_eq!(detail.to_error().code(), ErrorCode::ChecksumMismatch);

        let detail = BatchError::write("disk full").detail();
        assert_eq!(detail.message, "disk full");
        assert_eq!(detail.to_error().to_string(), "Write failed: disk full");
    }
}
