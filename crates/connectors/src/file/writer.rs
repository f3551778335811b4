use crate::file::object::FileObjectModel;
use async_trait::async_trait;
use engine_core::{context::ChunkContext, item::ItemWriter};
use model::error::BatchError;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Records written so far by this execution.
pub const WRITE_COUNT_KEY: &str = "file.write.count";
/// Path the execution resolved at open.
pub const WRITE_PATH_KEY: &str = "file.write.path";

/// Appends each chunk to a delimited file.
///
/// A fresh execution truncates the target. A restarted one finds
/// `file.write.count` in its context and keeps appending. Bytes of a chunk
/// that failed after reaching the file are not removed, so a restart can
/// repeat them. Partitions of one step must not share a target file.
pub struct FileItemWriter<T> {
    model: FileObjectModel,
    _item: PhantomData<fn(T)>,
}

impl<T> FileItemWriter<T> {
    pub fn new(model: FileObjectModel) -> Self {
        Self {
            model,
            _item: PhantomData,
        }
    }

    pub fn model(&self) -> &FileObjectModel {
        &self.model
    }

    fn path_of(ctx: &ChunkContext<'_>) -> Result<String, BatchError> {
        ctx.context()
            .get_string(WRITE_PATH_KEY)
            .ok_or_else(|| BatchError::internal("file writer used before open"))
    }
}

#[async_trait]
impl<T> ItemWriter for FileItemWriter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    type Item = T;

    async fn open(&self, ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        self.model.validate()?;

        let path = match ctx.context().get_string(WRITE_PATH_KEY) {
            Some(path) => path,
            None => {
                let path = self.model.resolve_path(ctx.job_execution())?;
                ctx.context_mut().put(WRITE_PATH_KEY, path.clone());
                path
            }
        };

        if !ctx.context().contains_key(WRITE_COUNT_KEY) {
            let mut out = self
                .model
                .fs
                .create(&path)
                .await
                .map_err(|e| e.into_write())?;
            out.shutdown()
                .await
                .map_err(|e| BatchError::write_with(format!("failed to create {path}"), e))?;
            ctx.context_mut().put(WRITE_COUNT_KEY, 0);
            info!(fs = %self.model.fs.name(), path = %path, "Output file created");
        } else {
            info!(
                fs = %self.model.fs.name(),
                path = %path,
                written = ctx.context().get_int(WRITE_COUNT_KEY, 0),
                "Appending to existing output"
            );
        }
        Ok(())
    }

    async fn write(&self, items: &[T], ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        let path = Self::path_of(ctx)?;
        let written = ctx.context().get_int(WRITE_COUNT_KEY, 0);

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.model.format.delimiter())
            .has_headers(self.model.has_header && written == 0)
            .from_writer(Vec::new());
        for item in items {
            wtr.serialize(item)
                .map_err(|e| BatchError::write_with(format!("cannot serialize record for {path}"), e))?;
        }
        let buf = wtr
            .into_inner()
            .map_err(|e| BatchError::write_with(format!("cannot encode chunk for {path}"), e.into_error()))?;

        let mut out = self
            .model
            .fs
            .append(&path)
            .await
            .map_err(|e| e.into_write())?;
        out.write_all(&buf)
            .await
            .map_err(|e| BatchError::write_with(format!("failed to append to {path}"), e))?;
        out.shutdown()
            .await
            .map_err(|e| BatchError::write_with(format!("failed to flush {path}"), e))?;

        ctx.context_mut()
            .put(WRITE_COUNT_KEY, written + items.len() as i64);
        debug!(path = %path, records = items.len(), bytes = buf.len(), "Chunk appended");
        Ok(())
    }

    async fn close(&self, ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        let Some(algorithm) = self.model.checksum else {
            return Ok(());
        };
        let path = Self::path_of(ctx)?;
        if ctx.is_stopped() {
            debug!(path = %path, "Step stopped, output incomplete; no checksum written");
            return Ok(());
        }
        let digest = algorithm
            .write_sidecar(self.model.fs.as_ref(), &path)
            .await
            .map_err(|e| e.into_write())?;
        info!(path = %path, algorithm = algorithm.extension(), digest = %digest, "Checksum written");
        Ok(())
    }
}
