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

//! Lifecycle hooks invoked around each task execution.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::models::{Task, TaskId};

/// Final status reported to [`TaskHooks::on_finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishStatus {
    Succeeded,
    Failed,
    Paused,
    Deleted,
}

impl FinishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishStatus::Succeeded => "succeeded",
            FinishStatus::Failed => "failed",
            FinishStatus::Paused => "paused",
            FinishStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FinishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFinish {
    pub task_id: TaskId,
    pub status: FinishStatus,
    pub message: Option<String>,
    pub provider_ref: Option<String>,
    pub elapsed_ms: u64,
}

/// Observer of task starts and finishes.
///
/// Hook failures are logged and never affect the task.
#[async_trait]
pub trait TaskHooks: Send + Sync {
    async fn on_start(&self, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_finish(&self, _finish: &TaskFinish) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl TaskHooks for NoopHooks {}

/// Awaits a hook, logging its error or panic instead of propagating it.
pub(crate) async fn run_best_effort<F>(hook: &'static str, task_id: TaskId, fut: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(task_id = %task_id, hook, error = %e, "Task hook failed");
        }
        Err(_) => {
            warn!(task_id = %task_id, hook, "Task hook panicked");
        }
    }
}
