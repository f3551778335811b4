use crate::{
    error::FileError,
    fs::{FileReader, FileSystem, FileWriter},
};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// [`FileSystem`] over a directory of the local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    name: String,
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FileError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, full: &Path, path: &str) -> Result<(), FileError> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::io(path, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, path: &str) -> Result<FileReader, FileError> {
        let file = fs::File::open(self.resolve(path)?)
            .await
            .map_err(|e| FileError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<FileWriter, FileError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        let file = fs::File::create(&full)
            .await
            .map_err(|e| FileError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn append(&self, path: &str) -> Result<FileWriter, FileError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .map_err(|e| FileError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, FileError> {
        let mut entries = fs::read_dir(self.resolve(dir)?)
            .await
            .map_err(|e| FileError::io(dir, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FileError::io(dir, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> Result<bool, FileError> {
        fs::try_exists(self.resolve(path)?)
            .await
            .map_err(|e| FileError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_appends_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new("local", dir.path());

        let mut w = fs.create("out/trades.csv").await.unwrap();
        w.write_all(b"a\n").await.unwrap();
        w.flush().await.unwrap();
        let mut w = fs.append("out/trades.csv").await.unwrap();
        w.write_all(b"b\n").await.unwrap();
        w.flush().await.unwrap();

        let mut content = String::new();
        fs.open("out/trades.csv")
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "a\nb\n");

        assert_eq!(fs.list("out").await.unwrap(), vec!["trades.csv"]);
        assert!(fs.exists("out/trades.csv").await.unwrap());
        assert!(!fs.exists("out/missing.csv").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new("local", dir.path());

        assert!(matches!(
            fs.open("../etc/passwd").await,
            Err(FileError::InvalidPath(_))
        ));
        assert!(matches!(
            fs.open("missing.csv").await,
            Err(FileError::NotFound(_))
        ));
    }
}
