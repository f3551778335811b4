use crate::{
    state::StateStore,
    transaction::{Transaction, TransactionManager},
};
use async_trait::async_trait;
use model::{
    core::identifiers::{JobExecutionId, StepExecutionId},
    error::BatchError,
    execution::{context::ExecutionContext, job::JobExecution, step::StepExecution},
};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Execution store and transaction manager over one sled database.
///
/// Layout (single default tree, bincode values):
/// - `job:{job_execution_id}` job execution row
/// - `step:{step_execution_id}` step execution row, context excluded
/// - `ctx:{step_execution_id}` execution context
/// - `job-steps:{job_execution_id}:{step_execution_id}` index, empty value
#[derive(Clone)]
pub struct SledStateStore {
    db: sled::Db,
    flush_on_commit: bool,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            BatchError::persistence_with(
                format!("failed to open state store at {}", path.as_ref().display()),
                e,
            )
        })?;
        Ok(Self {
            db,
            flush_on_commit: true,
        })
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self, BatchError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BatchError::persistence_with("failed to open temporary store", e))?;
        Ok(Self {
            db,
            flush_on_commit: false,
        })
    }

    pub fn with_flush(mut self, flush_on_commit: bool) -> Self {
        self.flush_on_commit = flush_on_commit;
        self
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    #[inline]
    fn job_key(id: &JobExecutionId) -> String {
        format!("job:{}", id)
    }

    #[inline]
    fn step_key(id: &StepExecutionId) -> String {
        format!("step:{}", id)
    }

    #[inline]
    fn ctx_key(id: &StepExecutionId) -> String {
        format!("ctx:{}", id)
    }

    #[inline]
    fn index_key(job: &JobExecutionId, step: &StepExecutionId) -> String {
        format!("job-steps:{}:{}", job, step)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BatchError> {
        let bytes = self
            .db
            .get(key)
            .map_err(|e| BatchError::persistence_with(format!("failed to read {key}"), e))?;
        match bytes {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<(), BatchError> {
        let bytes = encode(key, value)?;
        self.db
            .insert(key, bytes)
            .map_err(|e| BatchError::persistence_with(format!("failed to write {key}"), e))?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, BatchError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item
                .map_err(|e| BatchError::persistence_with(format!("failed to scan {prefix}"), e))?;
            out.push(decode(&String::from_utf8_lossy(&key), &value)?);
        }
        Ok(out)
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, BatchError> {
    bincode::serialize(value)
        .map_err(|e| BatchError::persistence_with(format!("failed to encode {key}"), e))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, BatchError> {
    bincode::deserialize(bytes)
        .map_err(|e| BatchError::persistence_with(format!("failed to decode {key}"), e))
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError> {
        self.insert(&Self::job_key(&execution.id), execution)
    }

    async fn load_job_execution(
        &self,
        id: &JobExecutionId,
    ) -> Result<Option<JobExecution>, BatchError> {
        self.get(&Self::job_key(id))
    }

    async fn job_executions(&self, job_name: &str) -> Result<Vec<JobExecution>, BatchError> {
        let mut executions: Vec<JobExecution> = self
            .scan::<JobExecution>("job:")?
            .into_iter()
            .filter(|je| je.job_name == job_name)
            .collect();
        executions.sort_by_key(|je| je.create_time);
        Ok(executions)
    }

    async fn save_step_execution(&self, execution: &StepExecution) -> Result<(), BatchError> {
        let row = encode(&Self::step_key(&execution.id), execution)?;
        let mut batch = sled::Batch::default();
        batch.insert(Self::step_key(&execution.id).as_str(), row);
        batch.insert(
            Self::index_key(&execution.job_execution_id, &execution.id).as_str(),
            Vec::<u8>::new(),
        );
        self.db.apply_batch(batch).map_err(|e| {
            BatchError::persistence_with(format!("failed to save step execution {}", execution.id), e)
        })
    }

    fn stage_step_execution(
        &self,
        tx: &mut dyn Transaction,
        execution: &StepExecution,
    ) -> Result<(), BatchError> {
        let step_key = Self::step_key(&execution.id);
        let ctx_key = Self::ctx_key(&execution.id);
        tx.put(&step_key, encode(&step_key, execution)?);
        tx.put(&ctx_key, encode(&ctx_key, execution.context())?);
        tx.put(
            &Self::index_key(&execution.job_execution_id, &execution.id),
            Vec::new(),
        );
        Ok(())
    }

    async fn load_step_execution(
        &self,
        id: &StepExecutionId,
    ) -> Result<Option<StepExecution>, BatchError> {
        let Some(mut execution) = self.get::<StepExecution>(&Self::step_key(id))? else {
            return Ok(None);
        };
        execution.set_context(self.load_context(id).await?);
        Ok(Some(execution))
    }

    async fn step_executions(
        &self,
        job_execution_id: &JobExecutionId,
    ) -> Result<Vec<StepExecution>, BatchError> {
        let prefix = format!("job-steps:{}:", job_execution_id);
        let mut executions = Vec::new();
        for item in self.db.scan_prefix(&prefix) {
            let (key, _) = item
                .map_err(|e| BatchError::persistence_with(format!("failed to scan {prefix}"), e))?;
            let key = String::from_utf8_lossy(&key);
            let step_id = StepExecutionId::from(&key[prefix.len()..]);
            if let Some(execution) = self.load_step_execution(&step_id).await? {
                executions.push(execution);
            }
        }
        executions.sort_by(|a, b| {
            a.start_time()
                .cmp(&b.start_time())
                .then_with(|| a.step_name.cmp(&b.step_name))
        });
        Ok(executions)
    }

    async fn save_context(
        &self,
        id: &StepExecutionId,
        context: &ExecutionContext,
    ) -> Result<(), BatchError> {
        self.insert(&Self::ctx_key(id), context)
    }

    async fn load_context(&self, id: &StepExecutionId) -> Result<ExecutionContext, BatchError> {
        Ok(self.get(&Self::ctx_key(id))?.unwrap_or_default())
    }
}

/// Writes staged into a [`sled::Batch`] and applied atomically on commit.
pub struct SledTransaction {
    id: String,
    db: sled::Db,
    batch: sled::Batch,
    flush_on_commit: bool,
}

#[async_trait]
impl Transaction for SledTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: &str, value: Vec<u8>) {
        self.batch.insert(key, value);
    }

    fn remove(&mut self, key: &str) {
        self.batch.remove(key);
    }

    async fn commit(self: Box<Self>) -> Result<(), BatchError> {
        let SledTransaction {
            id,
            db,
            batch,
            flush_on_commit,
        } = *self;

        db.apply_batch(batch).map_err(|e| {
            BatchError::persistence_with(format!("failed to commit transaction {id}"), e)
        })?;
        if flush_on_commit {
            db.flush_async().await.map_err(|e| {
                BatchError::persistence_with(format!("failed to flush transaction {id}"), e)
            })?;
        }

        debug!(tx_id = %id, "Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BatchError> {
        debug!(tx_id = %self.id, "Transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for SledStateStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BatchError> {
        Ok(Box::new(SledTransaction {
            id: format!("tx-{}", Uuid::new_v4().simple()),
            db: self.db.clone(),
            batch: sled::Batch::default(),
            flush_on_commit: self.flush_on_commit,
        }))
    }
}
