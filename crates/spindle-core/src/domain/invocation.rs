//! Invocation data: what the execution engine wants to run, in serialized form.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A job as described by the execution engine: a target and its arguments.
///
/// The core never interprets these fields; they are stored and handed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInvocation {
    pub type_name: String,
    pub method: String,
    pub parameter_types: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
}

impl JobInvocation {
    pub fn new(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method: method.into(),
            parameter_types: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, parameter_type: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameter_types.push(parameter_type.into());
        self.arguments.push(value);
        self
    }
}

/// Serialized invocation payload as persisted on the job document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationData {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "ParameterTypes")]
    pub parameter_types: String,
    #[serde(rename = "Arguments")]
    pub arguments: String,
}

impl InvocationData {
    pub fn serialize(job: &JobInvocation) -> Result<Self, StorageError> {
        if job.type_name.is_empty() {
            return Err(StorageError::invalid_argument("job", "type name is empty"));
        }
        if job.method.is_empty() {
            return Err(StorageError::invalid_argument("job", "method is empty"));
        }
        if job.parameter_types.len() != job.arguments.len() {
            return Err(StorageError::invalid_argument(
                "job",
                "parameter types and arguments differ in length",
            ));
        }
        Ok(Self {
            type_name: job.type_name.clone(),
            method: job.method.clone(),
            parameter_types: serde_json::to_string(&job.parameter_types)?,
            arguments: serde_json::to_string(&job.arguments)?,
        })
    }

    pub fn deserialize(&self) -> Result<JobInvocation, StorageError> {
        Ok(JobInvocation {
            type_name: self.type_name.clone(),
            method: self.method.clone(),
            parameter_types: serde_json::from_str(&self.parameter_types)?,
            arguments: serde_json::from_str(&self.arguments)?,
        })
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }
}
