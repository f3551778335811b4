use crate::{
    core::identifiers::JobExecutionId,
    error::{BatchError, FailureDetail},
    execution::{params::JobParameters, status::BatchStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One run of a job. Created per start (or restart) call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: JobExecutionId,
    pub job_name: String,
    pub parameters: JobParameters,
    status: BatchStatus,
    pub create_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    failure: Option<FailureDetail>,
    /// The execution this one restarts, if any.
    pub restart_of: Option<JobExecutionId>,
}

impl JobExecution {
    pub fn new(job_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            id: JobExecutionId::generate(),
            job_name: job_name.into(),
            parameters,
            status: BatchStatus::Created,
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            failure: None,
            restart_of: None,
        }
    }

    /// A fresh execution of the same job and parameters linked to `previous`.
    pub fn restart_of(previous: &JobExecution) -> Self {
        let mut next = Self::new(previous.job_name.clone(), previous.parameters.clone());
        next.restart_of = Some(previous.id.clone());
        next
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    /// Reference time for run-time placeholders: start time, else creation time.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.create_time)
    }

    pub fn transition(&mut self, next: BatchStatus) -> Result<(), BatchError> {
        if !self.status.can_transition_to(next) {
            return Err(BatchError::internal(format!(
                "job execution {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        let now = Utc::now();
        if next == BatchStatus::Started {
            self.start_time = Some(now);
        }
        if next.is_terminal() {
            self.end_time = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Moves to `Failed` and records the cause.
    pub fn fail(&mut self, failure: FailureDetail) -> Result<(), BatchError> {
        self.transition(BatchStatus::Failed)?;
        self.failure = Some(failure);
        Ok(())
    }
}
