use crate::{file::checksum::ChecksumAlgorithm, file::template::resolve_path, fs::FileSystem};
use model::{error::BatchError, execution::job::JobExecution};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
}

impl FileFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv => b',',
            FileFormat::Tsv => b'\t',
        }
    }
}

/// Where a file lives and how its records are laid out.
#[derive(Clone)]
pub struct FileObjectModel {
    pub fs: Arc<dyn FileSystem>,
    /// Path template, see [`crate::file::template`].
    pub path: String,
    pub format: FileFormat,
    pub has_header: bool,
    pub encoding: String,
    pub checksum: Option<ChecksumAlgorithm>,
}

impl FileObjectModel {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            format: FileFormat::Csv,
            has_header: true,
            encoding: "utf-8".to_string(),
            checksum: None,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// Concrete path for `job`, placeholders filled from its parameters or
    /// start time.
    pub fn resolve_path(&self, job: &JobExecution) -> Result<String, BatchError> {
        resolve_path(&self.path, &job.parameters, job.reference_time())
    }

    /// Only UTF-8 (and its ASCII subset) is supported.
    pub fn validate(&self) -> Result<(), BatchError> {
        match self.encoding.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" | "ascii" | "us-ascii" => Ok(()),
            other => Err(BatchError::configuration(format!(
                "unsupported encoding '{other}' for {}",
                self.path
            ))),
        }
    }
}

impl fmt::Debug for FileObjectModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileObjectModel")
            .field("fs", &self.fs.name())
            .field("path", &self.path)
            .field("format", &self.format)
            .field("has_header", &self.has_header)
            .field("encoding", &self.encoding)
            .field("checksum", &self.checksum)
            .finish()
    }
}
