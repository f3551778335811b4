use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobExecutionId(String);

impl JobExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocates a fresh random identifier.
    pub fn generate() -> Self {
        Self(format!("je-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobExecutionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for JobExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepExecutionId(String);

impl StepExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocates a fresh random identifier.
    pub fn generate() -> Self {
        Self(format!("se-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StepExecutionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for StepExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
