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

//! Control-state polling for running tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dal::TaskStore;
use crate::models::{TaskId, TaskStatus};

/// Why a running task was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    Paused,
    Deleted,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::Paused => "paused",
            AbortReason::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polls a task's control state on a fixed interval and cancels the
/// execution token when the task is paused or deleted.
///
/// The first recorded reason wins. Dropping the watcher stops polling.
pub struct ControlWatcher {
    task_id: TaskId,
    reason: Arc<Mutex<Option<AbortReason>>>,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ControlWatcher {
    /// Starts polling `task_id` every `interval`; `cancel` is the token the
    /// executor observes.
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        task_id: TaskId,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let reason = Arc::new(Mutex::new(None));
        let stop = CancellationToken::new();

        let handle = tokio::spawn(poll_loop(
            store,
            task_id,
            interval,
            cancel,
            stop.clone(),
            Arc::clone(&reason),
        ));

        Self {
            task_id,
            reason,
            stop,
            handle: Some(handle),
        }
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock()
    }

    /// Records a reason unless one is already set. Returns the reason in
    /// effect afterwards.
    pub fn record(&self, reason: AbortReason) -> AbortReason {
        record_first(&self.reason, reason)
    }

    /// Stops polling and waits for the poll loop to exit.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(task_id = %self.task_id, error = %e, "Control watcher ended abnormally");
                }
            }
        }
    }
}

impl Drop for ControlWatcher {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn record_first(slot: &Mutex<Option<AbortReason>>, reason: AbortReason) -> AbortReason {
    let mut current = slot.lock();
    *current.get_or_insert(reason)
}

async fn poll_loop(
    store: Arc<dyn TaskStore>,
    task_id: TaskId,
    period: Duration,
    cancel: CancellationToken,
    stop: CancellationToken,
    reason: Arc<Mutex<Option<AbortReason>>>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let detected = match store.control_state(task_id).await {
            Ok(None) => Some(AbortReason::Deleted),
            Ok(Some(state)) if state.status == TaskStatus::Paused => Some(AbortReason::Paused),
            Ok(Some(_)) => None,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to poll task control state");
                None
            }
        };

        if let Some(detected) = detected {
            let effective = record_first(&reason, detected);
            info!(task_id = %task_id, reason = %effective, "Cancelling running task");
            cancel.cancel();
            break;
        }
    }
    debug!(task_id = %task_id, "Control watcher stopped");
}
