use crate::{error::FileError, fs::FileSystem};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Digest written next to a file as `<path>.<extension>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256];

    pub fn extension(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }

    pub fn sidecar_path(&self, path: &str) -> String {
        format!("{path}.{}", self.extension())
    }

    pub async fn digest_file(&self, fs: &dyn FileSystem, path: &str) -> Result<String, FileError> {
        let mut bytes = Vec::new();
        fs.open(path)
            .await?
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| FileError::io(path, e))?;
        Ok(self.digest(&bytes))
    }

    /// Computes the digest of `path` and stores it in the sidecar.
    pub async fn write_sidecar(&self, fs: &dyn FileSystem, path: &str) -> Result<String, FileError> {
        let digest = self.digest_file(fs, path).await?;
        let sidecar = self.sidecar_path(path);
        let mut out = fs.create(&sidecar).await?;
        out.write_all(digest.as_bytes())
            .await
            .map_err(|e| FileError::io(&sidecar, e))?;
        out.shutdown().await.map_err(|e| FileError::io(&sidecar, e))?;
        Ok(digest)
    }

    /// Digest recorded in the sidecar of `path`, if there is one. Accepts the
    /// `<digest>  <file name>` layout of the usual command line tools. A
    /// sidecar without a digest is an error.
    pub async fn read_sidecar(
        &self,
        fs: &dyn FileSystem,
        path: &str,
    ) -> Result<Option<String>, FileError> {
        let sidecar = self.sidecar_path(path);
        if !fs.exists(&sidecar).await? {
            return Ok(None);
        }

        let mut content = String::new();
        fs.open(&sidecar)
            .await?
            .read_to_string(&mut content)
            .await
            .map_err(|e| FileError::io(&sidecar, e))?;
        match content.split_whitespace().next() {
            Some(digest) => Ok(Some(digest.to_ascii_lowercase())),
            None => Err(FileError::EmptySidecar(sidecar)),
        }
    }
}
