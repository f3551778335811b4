use crate::job::Job;
use dashmap::{DashMap, mapref::entry::Entry};
use model::error::BatchError;
use std::sync::Arc;
use tracing::info;

/// Registered jobs by name.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: Job) -> Result<(), BatchError> {
        match self.jobs.entry(job.name().to_string()) {
            Entry::Occupied(_) => Err(BatchError::configuration(format!(
                "job '{}' is already registered",
                job.name()
            ))),
            Entry::Vacant(slot) => {
                info!(job = %job.name(), steps = job.steps().len(), "Job registered");
                slot.insert(Arc::new(job));
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.get(name).map(|job| Arc::clone(job.value()))
    }

    /// Like [`JobRegistry::get`], but unknown names are a configuration error.
    pub fn lookup(&self, name: &str) -> Result<Arc<Job>, BatchError> {
        self.get(name)
            .ok_or_else(|| BatchError::configuration(format!("no job registered as '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
