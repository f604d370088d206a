//! Single Prompt Execution
//!
//! Runs one stored prompt outside any workflow. The prompt's declared
//! `execution_mode` picks the backend; prompts without a mode render their
//! template and return it unchanged.
//!
//! Batches run every request concurrently, bounded by a semaphore. Each
//! request gets its own result, so one failure never affects the others,
//! and results come back in request order.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;

use super::render::render;
use super::router::{select_standalone, BackendCapability};
use crate::backend::BackendSet;
use crate::error::{Error, Result};
use crate::registry::PromptRegistry;

/// One request to run a stored prompt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunRequest {
    #[serde(alias = "promptId")]
    pub prompt_id: String,

    #[serde(alias = "versionTag")]
    pub version_tag: String,

    /// Values for the template placeholders
    #[serde(alias = "userInput")]
    pub user_input: Option<HashMap<String, Value>>,
}

impl RunRequest {
    pub fn new(prompt_id: impl Into<String>, version_tag: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            version_tag: version_tag.into(),
            user_input: Some(HashMap::new()),
        }
    }

    /// Adds a placeholder value.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user_input
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<&HashMap<String, Value>> {
        let user_input = self.user_input.as_ref();
        match user_input {
            Some(input) if !self.prompt_id.trim().is_empty() && !self.version_tag.trim().is_empty() => {
                Ok(input)
            }
            _ => Err(Error::Validation(
                "prompt_id, version_tag and user_input are required".to_string(),
            )),
        }
    }
}

/// Output of a single prompt run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunResult {
    pub prompt_key: String,
    pub capability: BackendCapability,
    pub output: String,
}

/// Runs stored prompts one at a time or in batches.
#[derive(Clone, Debug)]
pub struct SingleRunner {
    registry: PromptRegistry,
    backends: BackendSet,
    concurrency: usize,
}

impl SingleRunner {
    pub fn new(registry: PromptRegistry, backends: BackendSet) -> Self {
        Self {
            registry,
            backends,
            concurrency: num_cpus::get(),
        }
    }

    /// Sets the maximum number of requests in flight during a batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one stored prompt.
    pub async fn run(&self, request: &RunRequest) -> Result<RunResult> {
        let user_input = request.validate()?;

        let prompt = self
            .registry
            .fetch(&request.prompt_id, &request.version_tag)
            .await?
            .ok_or_else(|| {
                Error::Lookup(format!("{}:{}", request.prompt_id, request.version_tag))
            })?;

        let values: HashMap<String, String> = user_input
            .iter()
            .map(|(key, value)| (key.clone(), value_to_text(value)))
            .collect();
        let rendered = render(&prompt.content, &values);

        let mode = prompt.execution_mode();
        let capability = select_standalone(mode.as_ref());
        debug!("Running {} on {}", prompt.key, capability);

        let output = self
            .backends
            .invoke(capability, &rendered)
            .await
            .map_err(|source| Error::Backend {
                module_id: request.prompt_id.clone(),
                capability,
                source,
            })?;

        Ok(RunResult {
            prompt_key: prompt.key,
            capability,
            output,
        })
    }

    /// Runs many requests concurrently.
    ///
    /// Fails only when the batch itself is empty; every request otherwise
    /// gets its own result, in request order.
    pub async fn run_batch(&self, requests: Vec<RunRequest>) -> Result<Vec<Result<RunResult>>> {
        if requests.is_empty() {
            return Err(Error::Validation(
                "batch must contain at least one request".to_string(),
            ));
        }

        info!(
            "Running batch of {} requests (max concurrent: {})",
            requests.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let runner = self.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                // Hold the permit until the request completes
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Task(e.to_string()))?;
                runner.run(&request).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Task(e.to_string())),
            };

            if let Err(e) = &result {
                warn!("Batch request {} failed: {}", index, e);
            }
            results.push(result);
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Batch finished: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );
        Ok(results)
    }
}

/// Text used when substituting a JSON input value into a template.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
