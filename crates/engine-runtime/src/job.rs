use engine_processing::Step;
use model::error::BatchError;
use std::collections::HashSet;

/// An ordered list of steps registered under a unique name.
#[derive(Debug, Clone)]
pub struct Job {
    name: String,
    steps: Vec<Step>,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

pub struct JobBuilder {
    name: String,
    steps: Vec<Step>,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> Result<Job, BatchError> {
        if self.name.trim().is_empty() {
            return Err(BatchError::configuration("job name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(BatchError::configuration(format!(
                "job '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(BatchError::configuration(format!(
                    "job '{}' declares step '{}' more than once",
                    self.name,
                    step.name()
                )));
            }
        }

        Ok(Job {
            name: self.name,
            steps: self.steps,
        })
    }
}
