use crate::{
    error::FileError,
    file::{checksum::ChecksumAlgorithm, object::FileObjectModel, template::resolve_path},
    fs::FileSystem,
};
use async_trait::async_trait;
use engine_core::tasklet::Tasklet;
use model::{
    error::BatchError,
    execution::{job::JobExecution, step::StepExecution},
};
use std::{fmt, sync::Arc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

pub const COPY_BYTES_KEY: &str = "file.copy.bytes";
pub const COPY_DESTINATION_KEY: &str = "file.copy.destination";

/// A path template on a particular file system.
#[derive(Clone)]
pub struct FileLocation {
    pub fs: Arc<dyn FileSystem>,
    pub path: String,
}

impl FileLocation {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }
}

impl From<&FileObjectModel> for FileLocation {
    fn from(model: &FileObjectModel) -> Self {
        Self::new(Arc::clone(&model.fs), model.path.clone())
    }
}

impl fmt::Debug for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fs.name(), self.path)
    }
}

/// Tasklet copying one file between file systems.
///
/// When the source has a checksum sidecar, the sidecar is copied too and the
/// destination's digest must match it. With no algorithm configured every
/// supported one is tried.
#[derive(Debug, Clone)]
pub struct FileCopy {
    source: FileLocation,
    destination: FileLocation,
    checksum: Option<ChecksumAlgorithm>,
}

impl FileCopy {
    pub fn new(source: FileLocation, destination: FileLocation) -> Self {
        Self {
            source,
            destination,
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    async fn copy_bytes(&self, from: &str, to: &str) -> Result<u64, FileError> {
        let mut data = Vec::new();
        self.source
            .fs
            .open(from)
            .await?
            .read_to_end(&mut data)
            .await
            .map_err(|e| FileError::io(from, e))?;

        let mut out = self.destination.fs.create(to).await?;
        out.write_all(&data).await.map_err(|e| FileError::io(to, e))?;
        out.shutdown().await.map_err(|e| FileError::io(to, e))?;
        Ok(data.len() as u64)
    }

    async fn write_digest(&self, path: &str, digest: &str) -> Result<(), FileError> {
        let mut out = self.destination.fs.create(path).await?;
        out.write_all(digest.as_bytes())
            .await
            .map_err(|e| FileError::io(path, e))?;
        out.shutdown().await.map_err(|e| FileError::io(path, e))
    }

    /// Returns whether any sidecar was found and verified.
    async fn verify(&self, from: &str, to: &str) -> Result<bool, BatchError> {
        let algorithms = match self.checksum {
            Some(algorithm) => vec![algorithm],
            None => ChecksumAlgorithm::ALL.to_vec(),
        };

        let mut verified = false;
        for algorithm in algorithms {
            let Some(expected) = algorithm.read_sidecar(self.source.fs.as_ref(), from).await?
            else {
                continue;
            };

            let actual = algorithm
                .digest_file(self.destination.fs.as_ref(), to)
                .await?;
            if actual != expected {
                return Err(BatchError::checksum_mismatch(to, expected, actual));
            }
            self.write_digest(&algorithm.sidecar_path(to), &expected)
                .await?;
            verified = true;
        }
        Ok(verified)
    }
}

#[async_trait]
impl Tasklet for FileCopy {
    async fn execute(&self, step: &mut StepExecution, job: &JobExecution) -> Result<(), BatchError> {
        let at = job.reference_time();
        let from = resolve_path(&self.source.path, &job.parameters, at)?;
        let to = resolve_path(&self.destination.path, &job.parameters, at)?;

        let bytes = self.copy_bytes(&from, &to).await?;
        let verified = self.verify(&from, &to).await?;
        if !verified && self.checksum.is_some() {
            warn!(source = %from, "No checksum sidecar next to source; copied unverified");
        }

        step.context_mut().put(COPY_BYTES_KEY, bytes);
        step.context_mut().put(COPY_DESTINATION_KEY, to.clone());
        info!(
            source = %format!("{}:{from}", self.source.fs.name()),
            destination = %format!("{}:{to}", self.destination.fs.name()),
            bytes,
            verified,
            "File copied"
        );
        Ok(())
    }
}
