//! Execution gateway: one remote execution per run, normalized.
//!
//! The remote API reports failures in three tiers: a top-level `message`, a
//! `compile` stage and a `run` stage. [`ExecutionOutcome::from_response`]
//! picks exactly one outcome in that priority order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{ExecuteRequest, ExecuteResponse, ExecutionResult, Language};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Execution API request failed: {0}")]
    Transport(String),

    #[error("Execution API returned HTTP {0}")]
    Status(u16),

    #[error("Invalid execution API response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Remote code-execution service
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, GatewayError>;
}

/// Piston-compatible HTTP client
#[derive(Debug, Clone)]
pub struct PistonClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PistonClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ExecutionApi for PistonClient {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, GatewayError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        Ok(response.json::<ExecuteResponse>().await?)
    }
}

/// Normalized result of one remote execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    GeneralFailure { message: String },
    CompileFailure { text: String },
    RuntimeFailure { text: String },
    Success { text: String },
}

impl ExecutionOutcome {
    pub fn from_response(response: ExecuteResponse) -> Self {
        if let Some(message) = response.message.filter(|m| !m.trim().is_empty()) {
            return ExecutionOutcome::GeneralFailure {
                message: message.trim().to_string(),
            };
        }

        if let Some(compile) = response.compile.as_ref().filter(|stage| stage.failed()) {
            return ExecutionOutcome::CompileFailure {
                text: compile.diagnostic().trim().to_string(),
            };
        }

        match response.run {
            Some(run) if run.failed() => ExecutionOutcome::RuntimeFailure {
                text: run.diagnostic().trim().to_string(),
            },
            Some(run) => ExecutionOutcome::Success {
                text: run.output.trim().to_string(),
            },
            None => ExecutionOutcome::Success {
                text: String::new(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            ExecutionOutcome::GeneralFailure { message } => message,
            ExecutionOutcome::CompileFailure { text }
            | ExecutionOutcome::RuntimeFailure { text }
            | ExecutionOutcome::Success { text } => text,
        }
    }

    /// Snapshot in the shape the execution history stores, whatever the branch.
    pub fn to_result(&self, code: &str) -> ExecutionResult {
        match self {
            ExecutionOutcome::Success { text } => ExecutionResult {
                code: code.to_string(),
                output: text.clone(),
                error: None,
            },
            failure => ExecutionResult {
                code: code.to_string(),
                output: String::new(),
                error: Some(failure.text().to_string()),
            },
        }
    }
}

/// Maps a (language, source) pair onto the execution API
#[derive(Clone)]
pub struct ExecutionGateway {
    api: Arc<dyn ExecutionApi>,
}

impl ExecutionGateway {
    pub fn new(api: Arc<dyn ExecutionApi>) -> Self {
        Self { api }
    }

    /// Submit `source` once. Transport and decode errors propagate; the caller
    /// decides what the user sees.
    pub async fn execute(
        &self,
        language: Language,
        source: &str,
    ) -> Result<ExecutionOutcome, GatewayError> {
        let request = ExecuteRequest::new(language, source);
        debug!(
            language = %request.language,
            version = %request.version,
            bytes = source.len(),
            "Submitting code for execution"
        );
        let response = self.api.execute(&request).await?;
        Ok(ExecutionOutcome::from_response(response))
    }
}
