/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Task Execution
//!
//! The engine does not know how to perform a task; it hands each claimed task
//! to a [`TaskExecutor`] together with a [`CancellationToken`]. While the
//! executor runs, a [`control::ControlWatcher`] re-reads the task's live state
//! and raises the token when the task is paused or deleted externally.
//! Cancellation is cooperative: the executor has to observe the token and
//! unwind on its own.
//!
//! Once the executor returns, the runner hands the outcome to the
//! [`finalizer::ResultFinalizer`], which persists it with bounded-backoff
//! retries until the write succeeds or the task is gone.

pub mod control;
pub mod finalizer;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{ResultPatch, Task};

pub use control::{AbortReason, ControlWatcher};
pub use finalizer::{FinalizeOutcome, FinalizerConfig, ResultFinalizer};

/// Fields reported by a successful execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutput {
    pub logs: Vec<String>,
    /// Total number of log lines produced, which may exceed `logs.len()`
    /// when the executor keeps a rolling window. The stored counter never
    /// decreases on finalize, so lines already streamed through
    /// `append_logs` stay counted.
    pub seq: u64,
    pub output: String,
    pub provider_ref: Option<String>,
    pub extra: Map<String, Value>,
}

impl ExecutionOutput {
    /// Builds an output whose `seq` equals the number of lines.
    pub fn with_logs(logs: Vec<String>) -> Self {
        let seq = logs.len() as u64;
        Self {
            logs,
            seq,
            ..Self::default()
        }
    }

    pub(crate) fn into_patch(self) -> ResultPatch {
        ResultPatch {
            logs: Some(self.logs),
            seq: Some(self.seq),
            output: Some(self.output),
            provider_ref: self.provider_ref,
            message: Some(None),
            extra: self.extra,
        }
    }
}

/// A failed or aborted execution, carrying whatever the executor captured
/// before it stopped.
#[derive(Debug, Clone, Default, Error)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub message: String,
    pub logs: Option<Vec<String>>,
    pub seq: Option<u64>,
    pub output: Option<String>,
    pub provider_ref: Option<String>,
    pub extra: Map<String, Value>,
    /// Set when the executor stopped because cancellation was requested.
    pub aborted: bool,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure caused by observing the cancellation token.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            aborted: true,
            ..Self::new(message)
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>, seq: u64) -> Self {
        self.logs = Some(logs);
        self.seq = Some(seq);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_provider_ref(mut self, provider_ref: impl Into<String>) -> Self {
        self.provider_ref = Some(provider_ref.into());
        self
    }

    /// Patch preserving the captured partial fields, with the given message.
    pub(crate) fn into_patch(self, message: String) -> ResultPatch {
        ResultPatch {
            seq: match (&self.logs, self.seq) {
                (Some(logs), seq) => Some(seq.unwrap_or(0).max(logs.len() as u64)),
                (None, seq) => seq,
            },
            logs: self.logs,
            output: self.output,
            provider_ref: self.provider_ref,
            message: Some(Some(message)),
            extra: self.extra,
        }
    }
}

/// The component that performs the actual work of a task.
///
/// Implementations should watch `cancel` and return an
/// [`ExecutionFailure::aborted`] promptly once it fires.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionFailure>;
}
