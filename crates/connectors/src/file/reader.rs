use crate::file::object::FileObjectModel;
use async_trait::async_trait;
use csv::StringRecord;
use engine_core::{
    context::ChunkContext,
    item::ItemReader,
    partition::{Partitioner, contiguous_ranges},
};
use model::{
    error::BatchError,
    execution::{context::ExecutionContext, job::JobExecution, step::StepExecution},
};
use serde::de::DeserializeOwned;
use std::{collections::HashMap, marker::PhantomData, sync::Arc};
use tokio::{io::AsyncReadExt, sync::Mutex};
use tracing::info;

/// Index of the next record to read.
pub const READ_OFFSET_KEY: &str = "file.read.offset";
/// Exclusive upper bound of the records assigned to a partition.
pub const READ_END_KEY: &str = "file.read.end";
/// Path the execution resolved at open; kept so restarts read the same file.
pub const READ_PATH_KEY: &str = "file.read.path";

struct LoadedFile {
    headers: Option<StringRecord>,
    records: Vec<StringRecord>,
}

/// Reads delimited records of a file and deserializes each into `T`.
///
/// The position lives in the execution context, so one reader serves any
/// number of partitions and resumes where the last committed chunk ended.
pub struct FileItemReader<T> {
    model: FileObjectModel,
    cache: Arc<Mutex<HashMap<String, Arc<LoadedFile>>>>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for FileItemReader<T> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            cache: Arc::clone(&self.cache),
            _item: PhantomData,
        }
    }
}

impl<T> FileItemReader<T> {
    pub fn new(model: FileObjectModel) -> Self {
        Self {
            model,
            cache: Arc::new(Mutex::new(HashMap::new())),
            _item: PhantomData,
        }
    }

    pub fn model(&self) -> &FileObjectModel {
        &self.model
    }

    async fn load(&self, path: &str) -> Result<Arc<LoadedFile>, BatchError> {
        let mut cache = self.cache.lock().await;
        if let Some(file) = cache.get(path) {
            return Ok(Arc::clone(file));
        }

        self.model.validate()?;
        let mut bytes = Vec::new();
        self.model
            .fs
            .open(path)
            .await
            .map_err(|e| e.into_read())?
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| BatchError::read_with(format!("failed to read {path}"), e))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| BatchError::read_with(format!("{path} is not valid UTF-8"), e))?;

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.model.format.delimiter())
            .has_headers(self.model.has_header)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = if self.model.has_header {
            Some(
                rdr.headers()
                    .map_err(|e| BatchError::read_with(format!("bad header in {path}"), e))?
                    .clone(),
            )
        } else {
            None
        };
        let records = rdr
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BatchError::read_with(format!("malformed record in {path}"), e))?;

        info!(
            fs = %self.model.fs.name(),
            path = %path,
            records = records.len(),
            "File loaded"
        );
        let file = Arc::new(LoadedFile { headers, records });
        cache.insert(path.to_string(), Arc::clone(&file));
        Ok(file)
    }

    fn path_of(ctx: &ChunkContext<'_>) -> Result<String, BatchError> {
        ctx.context()
            .get_string(READ_PATH_KEY)
            .ok_or_else(|| BatchError::internal("file reader used before open"))
    }
}

#[async_trait]
impl<T> ItemReader for FileItemReader<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;

    async fn open(&self, ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        let path = match ctx.context().get_string(READ_PATH_KEY) {
            Some(path) => path,
            None => {
                let path = self.model.resolve_path(ctx.job_execution())?;
                ctx.context_mut().put(READ_PATH_KEY, path.clone());
                path
            }
        };
        self.load(&path).await.map(|_| ())
    }

    async fn read(&self, ctx: &mut ChunkContext<'_>) -> Result<Option<T>, BatchError> {
        let path = Self::path_of(ctx)?;
        let file = self.load(&path).await?;

        let total = file.records.len() as i64;
        let offset = ctx.context().get_int(READ_OFFSET_KEY, 0);
        let end = ctx.context().get_int(READ_END_KEY, total).min(total);
        if offset >= end {
            return Ok(None);
        }

        let item = file.records[offset as usize]
            .deserialize(file.headers.as_ref())
            .map_err(|e| {
                BatchError::read_with(format!("{path}: cannot map record {}", offset + 1), e)
            })?;
        ctx.context_mut().put(READ_OFFSET_KEY, offset + 1);
        Ok(Some(item))
    }
}

/// Splits the file into contiguous record ranges.
#[async_trait]
impl<T> Partitioner for FileItemReader<T> {
    async fn partition(
        &self,
        job: &JobExecution,
        _step: &StepExecution,
        partitions: usize,
    ) -> Result<Vec<ExecutionContext>, BatchError> {
        let path = self.model.resolve_path(job)?;
        let file = self.load(&path).await?;

        Ok(contiguous_ranges(file.records.len() as u64, partitions)
            .into_iter()
            .map(|(start, end)| {
                let mut ctx = ExecutionContext::new();
                ctx.put(READ_PATH_KEY, path.clone());
                ctx.put(READ_OFFSET_KEY, start);
                ctx.put(READ_END_KEY, end);
                ctx
            })
            .collect())
    }
}
