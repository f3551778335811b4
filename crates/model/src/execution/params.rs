use crate::{core::value::Value, error::BatchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat key/value parameter set a job execution is started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    inner: BTreeMap<String, Value>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object such as `{"date": "2024-03-01", "rand": 7}`.
    /// An empty string yields an empty parameter set.
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }

        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BatchError::configuration(format!("invalid job parameters: {e}")))?;

        let object = parsed.as_object().ok_or_else(|| {
            BatchError::configuration("job parameters must be a JSON object".to_string())
        })?;

        Ok(Self {
            inner: object
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        })
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.inner.get(key).and_then(Value::as_string)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
