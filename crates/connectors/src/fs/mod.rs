use crate::error::FileError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod local;

pub use local::LocalFileSystem;

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Named-path storage a file collaborator reads from or writes to.
///
/// Paths are relative, `/`-separated and interpreted by the backend.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn open(&self, path: &str) -> Result<FileReader, FileError>;

    /// Creates or truncates `path`, including missing parent directories.
    async fn create(&self, path: &str) -> Result<FileWriter, FileError>;

    /// Opens `path` for appending, creating it if needed.
    async fn append(&self, path: &str) -> Result<FileWriter, FileError>;

    /// Entry names directly under `dir`, sorted.
    async fn list(&self, dir: &str) -> Result<Vec<String>, FileError>;

    async fn exists(&self, path: &str) -> Result<bool, FileError>;
}
