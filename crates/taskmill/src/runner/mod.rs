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

//! # Task Runner
//!
//! The runner turns queued tasks into serialized executions. A call to
//! [`TaskRunner::trigger`] starts a *drain pass* that claims and processes
//! tasks one at a time until nothing claimable remains.
//!
//! Triggers coalesce: a trigger that arrives while a drain is already running
//! only marks the runner as pending and returns immediately. When the running
//! drain finishes its pass it sees the pending mark and runs exactly one more
//! pass, however many triggers arrived in the meantime.
//!
//! ```text
//! Idle --trigger--> Running --pass done, pending--> Running (next pass)
//!                      |
//!                      +--pass done, not pending--> Idle
//! ```
//!
//! Per claimed task the runner:
//! 1. calls the start hook,
//! 2. clears run-scoped result fields,
//! 3. runs the executor under a cancellation token watched by a
//!    [`ControlWatcher`],
//! 4. persists the outcome through the [`ResultFinalizer`],
//! 5. calls the finish hook.
//!
//! Errors and panics while processing one task never end the drain.

pub mod config;
pub mod hooks;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dal::TaskStore;
use crate::executor::{
    AbortReason, ControlWatcher, ExecutionFailure, ExecutionOutput, FinalizeOutcome,
    ResultFinalizer, TaskExecutor,
};
use crate::models::{ResultPatch, Task, TaskStatus};

pub use config::{RunnerConfig, RunnerConfigBuilder};
pub use hooks::{FinishStatus, NoopHooks, TaskFinish, TaskHooks};

/// Message stored on a task that was paused while it ran.
pub const PAUSED_MESSAGE: &str = "Task paused before completion";

/// Result of a call to [`TaskRunner::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A drain was already running; it will run one more pass.
    Coalesced,
    /// This call ran the drain itself.
    Drained { passes: u32 },
}

/// Counters exposed for observability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunnerStats {
    pub drain_passes: u64,
    pub tasks_processed: u64,
    pub coalesced_triggers: u64,
}

#[derive(Debug, Default)]
struct TriggerState {
    running: bool,
    pending: bool,
}

struct RunnerInner {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    hooks: Arc<dyn TaskHooks>,
    finalizer: ResultFinalizer,
    config: RunnerConfig,
    state: Mutex<TriggerState>,
    stats: Mutex<RunnerStats>,
}

/// Clears the running flag when a drain is dropped or unwinds before it
/// could finish normally.
struct RunningGuard<'a> {
    state: &'a Mutex<TriggerState>,
    finished: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.state.lock();
            state.running = false;
            state.pending = false;
        }
    }
}

/// How a processed task is persisted and reported.
struct Disposition {
    finish: FinishStatus,
    /// `None` when nothing is written (the task was deleted).
    write: Option<(TaskStatus, ResultPatch)>,
    message: Option<String>,
    provider_ref: Option<String>,
}

/// Serial, coalescing task runner. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self::with_hooks(store, executor, Arc::new(NoopHooks), config)
    }

    pub fn with_hooks(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        hooks: Arc<dyn TaskHooks>,
        config: RunnerConfig,
    ) -> Self {
        let finalizer = ResultFinalizer::new(Arc::clone(&store), config.finalizer());
        Self {
            inner: Arc::new(RunnerInner {
                store,
                executor,
                hooks,
                finalizer,
                config,
                state: Mutex::new(TriggerState::default()),
                stats: Mutex::new(RunnerStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> RunnerStats {
        *self.inner.stats.lock()
    }

    /// Whether a drain is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Requests a drain. See the module docs for the coalescing rules.
    pub async fn trigger(&self) -> TriggerOutcome {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                state.pending = true;
                self.inner.stats.lock().coalesced_triggers += 1;
                debug!("Drain already running, trigger coalesced");
                return TriggerOutcome::Coalesced;
            }
            state.running = true;
            state.pending = false;
        }
        let mut guard = RunningGuard {
            state: &self.inner.state,
            finished: false,
        };

        let runner_name = self.inner.config.runner_name().unwrap_or("default");
        let span = info_span!("drain", runner = runner_name);
        let mut passes = 0u32;
        loop {
            passes += 1;
            self.drain_pass().instrument(span.clone()).await;

            // Checking pending and leaving the running state happen under one
            // lock so a trigger can never slip in between.
            let mut state = self.inner.state.lock();
            if state.pending {
                state.pending = false;
                debug!(passes, "Trigger arrived during drain, running another pass");
                continue;
            }
            state.running = false;
            guard.finished = true;
            break;
        }
        TriggerOutcome::Drained { passes }
    }

    /// Runs [`trigger`](Self::trigger) on the tokio runtime.
    pub fn spawn_trigger(&self) -> JoinHandle<TriggerOutcome> {
        let runner = self.clone();
        tokio::spawn(async move { runner.trigger().await })
    }

    /// Triggers every `interval` until `shutdown` fires. A drain in progress
    /// when shutdown is requested runs to completion first.
    pub async fn run_periodic(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "Periodic runner started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.trigger().await;
                    debug!(?outcome, "Periodic trigger finished");
                }
            }
        }
        info!("Periodic runner stopped");
    }

    async fn drain_pass(&self) {
        self.inner.stats.lock().drain_passes += 1;
        let mut processed = 0u64;

        loop {
            let now = Local::now().fixed_offset();
            let task = match self
                .inner
                .store
                .claim_next(self.inner.config.scan_limit(), now)
                .await
            {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to claim next task, ending drain pass");
                    break;
                }
            };

            let task_id = task.id;
            if let Err(panic) = AssertUnwindSafe(self.process(task)).catch_unwind().await {
                error!(
                    task_id = %task_id,
                    panic = %panic_message(panic.as_ref()),
                    "Task processing panicked"
                );
            }
            processed += 1;
            self.inner.stats.lock().tasks_processed += 1;
        }

        debug!(processed, "Drain pass finished");
    }

    async fn process(&self, task: Task) {
        let inner = &self.inner;
        let task_id = task.id;
        let started = Instant::now();
        info!(
            task_id = %task_id,
            event_type = %task.event_type,
            retries = task.retries,
            "Starting task"
        );

        hooks::run_best_effort("on_start", task_id, inner.hooks.on_start(&task)).await;

        if let Err(e) = inner
            .store
            .patch_result(task_id, &ResultPatch::run_reset())
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to reset result before execution");
        }

        let cancel = CancellationToken::new();
        let watcher = ControlWatcher::spawn(
            Arc::clone(&inner.store),
            task_id,
            inner.config.control_poll_interval(),
            cancel.clone(),
        );

        let executor = Arc::clone(&inner.executor);
        let handle = tokio::spawn(async move { executor.execute(&task, cancel).await });
        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let message = format!("Executor panicked: {}", panic_message(panic.as_ref()));
                Err(ExecutionFailure::new(message))
            }
            Err(e) => Err(ExecutionFailure::new(format!("Executor task failed: {e}"))),
        };

        let disposition = self.resolve(&watcher, result);
        watcher.stop().await;

        let mut finish = disposition.finish;
        if let Some((status, mut patch)) = disposition.write {
            trim_logs(&mut patch, inner.config.log_window());
            let outcome = inner.finalizer.finalize(task_id, &patch, status).await;
            debug!(task_id = %task_id, ?outcome, "Finalization finished");
            if let FinalizeOutcome::TaskGone { .. } = outcome {
                finish = FinishStatus::Deleted;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(task_id = %task_id, status = %finish, elapsed_ms, "Task finished");

        let summary = TaskFinish {
            task_id,
            status: finish,
            message: disposition.message,
            provider_ref: disposition.provider_ref,
            elapsed_ms,
        };
        hooks::run_best_effort("on_finish", task_id, inner.hooks.on_finish(&summary)).await;
    }

    /// Maps the execution result and any abort reason to what gets written.
    fn resolve(
        &self,
        watcher: &ControlWatcher,
        result: Result<ExecutionOutput, ExecutionFailure>,
    ) -> Disposition {
        let reason = match (watcher.reason(), &result) {
            (Some(reason), _) => Some(reason),
            (None, Err(failure)) if failure.aborted => Some(watcher.record(AbortReason::Paused)),
            _ => None,
        };

        match (reason, result) {
            (Some(AbortReason::Deleted), result) => Disposition {
                finish: FinishStatus::Deleted,
                write: None,
                message: None,
                provider_ref: provider_ref_of(&result),
            },
            (Some(AbortReason::Paused), result) => {
                let provider_ref = provider_ref_of(&result);
                let patch = match result {
                    Ok(output) => {
                        let mut patch = output.into_patch();
                        patch.message = Some(Some(PAUSED_MESSAGE.to_string()));
                        patch
                    }
                    Err(failure) => failure.into_patch(PAUSED_MESSAGE.to_string()),
                };
                Disposition {
                    finish: FinishStatus::Paused,
                    write: Some((TaskStatus::Paused, patch)),
                    message: Some(PAUSED_MESSAGE.to_string()),
                    provider_ref,
                }
            }
            (None, Ok(output)) => Disposition {
                finish: FinishStatus::Succeeded,
                message: None,
                provider_ref: output.provider_ref.clone(),
                write: Some((TaskStatus::Succeeded, output.into_patch())),
            },
            (None, Err(failure)) => {
                let message = failure.message.clone();
                Disposition {
                    finish: FinishStatus::Failed,
                    message: Some(message.clone()),
                    provider_ref: failure.provider_ref.clone(),
                    write: Some((TaskStatus::Failed, failure.into_patch(message))),
                }
            }
        }
    }
}

fn provider_ref_of(result: &Result<ExecutionOutput, ExecutionFailure>) -> Option<String> {
    match result {
        Ok(output) => output.provider_ref.clone(),
        Err(failure) => failure.provider_ref.clone(),
    }
}

/// Keeps only the newest `window` lines; `seq` still counts every line.
fn trim_logs(patch: &mut ResultPatch, window: usize) {
    if let Some(logs) = patch.logs.as_mut() {
        if logs.len() > window {
            let excess = logs.len() - window;
            logs.drain(..excess);
        }
        let retained = logs.len() as u64;
        patch.seq = Some(patch.seq.map_or(retained, |seq| seq.max(retained)));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
