use crate::step::StepOutcome;
use engine_core::{
    state::StateStore,
    transaction::{Transaction, TransactionManager},
};
use model::{
    error::BatchError,
    execution::{status::BatchStatus, step::StepExecution},
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Persists step execution lifecycle and chunk checkpoints.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn StateStore>,
    transactions: Arc<dyn TransactionManager>,
}

impl StateManager {
    pub fn new(store: Arc<dyn StateStore>, transactions: Arc<dyn TransactionManager>) -> Self {
        Self {
            store,
            transactions,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Moves a fresh execution to STARTED and records it. A seeded context is
    /// saved as the execution's first checkpoint.
    pub async fn begin_step(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        execution.transition(BatchStatus::Starting)?;
        execution.transition(BatchStatus::Started)?;
        self.store.save_step_execution(execution).await?;
        if !execution.context().is_empty() {
            self.store
                .save_context(&execution.id, execution.context())
                .await?;
        }

        info!(
            step = %execution.step_name,
            step_execution_id = %execution.id,
            "Step started"
        );
        Ok(())
    }

    pub async fn begin_chunk(&self) -> Result<Box<dyn Transaction>, BatchError> {
        self.transactions.begin().await
    }

    /// Stages the step row and its context into `tx` and commits.
    pub async fn commit_chunk(
        &self,
        mut tx: Box<dyn Transaction>,
        staged: &StepExecution,
    ) -> Result<(), BatchError> {
        if let Err(e) = self.store.stage_step_execution(tx.as_mut(), staged) {
            self.rollback(tx).await;
            return Err(e);
        }
        tx.commit().await
    }

    pub async fn rollback(&self, tx: Box<dyn Transaction>) {
        let id = tx.id().to_string();
        if let Err(e) = tx.rollback().await {
            warn!(tx_id = %id, error = %e, "Rollback failed");
        }
    }

    /// Applies the terminal status and records it.
    ///
    /// Failed and stopped executions keep their last committed context; a
    /// completed one is saved together with its context.
    pub async fn finish_step(
        &self,
        execution: &mut StepExecution,
        outcome: StepOutcome,
    ) -> Result<(), BatchError> {
        match outcome {
            StepOutcome::Completed => {
                execution.transition(BatchStatus::Completed)?;
                let tx = self.begin_chunk().await?;
                self.commit_chunk(tx, execution).await?;
                info!(
                    step = %execution.step_name,
                    step_execution_id = %execution.id,
                    read = execution.read_count(),
                    written = execution.write_count(),
                    filtered = execution.filter_count(),
                    commits = execution.commit_count(),
                    "Step completed"
                );
            }
            StepOutcome::Stopped => {
                execution.transition(BatchStatus::Stopped)?;
                self.store.save_step_execution(execution).await?;
                warn!(
                    step = %execution.step_name,
                    step_execution_id = %execution.id,
                    "Step stopped"
                );
            }
            StepOutcome::Failed(err) => {
                execution.fail(err.detail())?;
                self.store.save_step_execution(execution).await?;
                error!(
                    step = %execution.step_name,
                    step_execution_id = %execution.id,
                    code = %err.code(),
                    error = %err,
                    "Step failed"
                );
            }
        }
        Ok(())
    }
}
