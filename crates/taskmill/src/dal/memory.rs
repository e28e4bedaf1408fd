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

//! In-memory task store.
//!
//! Not durable and not shared across processes. Suitable for tests and for
//! embedding the runner in a process that owns its queue.

use std::collections::{BinaryHeap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::{is_claimable, TaskStore};
use crate::database::{creation_timestamp, now};
use crate::error::StoreError;
use crate::logs::LogSnapshot;
use crate::models::{
    ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskResult, TaskStatus,
};

/// Process-local [`TaskStore`] backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.tasks.read().map_err(poison_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Inserts a fully formed task, replacing any task with the same id.
    pub fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.write().map_err(poison_err)?.insert(task.id, task);
        Ok(())
    }

    /// Ids of the oldest `limit` tasks matching `filter`, oldest first.
    ///
    /// Keeps a max-heap of at most `limit` keys, so only the selected tasks
    /// are ever cloned by callers.
    fn oldest(tasks: &HashMap<TaskId, Task>, filter: &TaskFilter, limit: usize) -> Vec<TaskId> {
        if limit == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(limit.min(tasks.len()) + 1);
        for task in tasks.values().filter(|t| filter.matches(t)) {
            heap.push((task.created_at, task.id));
            if heap.len() > limit {
                heap.pop();
            }
        }
        heap.into_sorted_vec().into_iter().map(|(_, id)| id).collect()
    }

    fn with_task<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Result<Option<R>, StoreError> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        Ok(tasks.get_mut(&id).map(f))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let created_at = creation_timestamp();
        let task = Task {
            id: TaskId::new_v4(),
            group_id: new_task.group_id,
            event_type: new_task.event_type,
            status: TaskStatus::Queued,
            archived: false,
            payload: new_task.payload,
            retries: 0,
            result: TaskResult::default(),
            created_at,
            updated_at: created_at,
        };
        self.insert(task.clone())?;
        debug!(task_id = %task.id, event_type = %task.event_type, "Enqueued task");
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().map_err(poison_err)?.get(&id).cloned())
    }

    async fn list(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(poison_err)?;
        Ok(Self::oldest(&tasks, filter, limit)
            .into_iter()
            .filter_map(|id| tasks.get(&id).cloned())
            .collect())
    }

    async fn claim_next(
        &self,
        scan_limit: usize,
        now_local: DateTime<FixedOffset>,
    ) -> Result<Option<Task>, StoreError> {
        // The write lock is held for the whole scan, which makes the check
        // and the transition a single atomic step.
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        let filter = TaskFilter {
            status: Some(TaskStatus::Queued),
            archived: Some(false),
        };
        let candidates = Self::oldest(&tasks, &filter, scan_limit);

        for id in candidates {
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            if !is_claimable(&task.payload, &now_local) {
                debug!(task_id = %id, "Skipping task outside its schedule window");
                continue;
            }
            task.status = TaskStatus::Processing;
            task.updated_at = now();
            return Ok(Some(task.clone()));
        }
        Ok(None)
    }

    async fn control_state(&self, id: TaskId) -> Result<Option<ControlState>, StoreError> {
        Ok(self
            .tasks
            .read()
            .map_err(poison_err)?
            .get(&id)
            .map(Task::control_state))
    }

    async fn patch_result(&self, id: TaskId, patch: &ResultPatch) -> Result<(), StoreError> {
        self.with_task(id, |task| {
            task.result.apply(patch);
            task.updated_at = now();
        })?
        .ok_or(StoreError::TaskNotFound(id))
    }

    async fn finalize(
        &self,
        id: TaskId,
        patch: &ResultPatch,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidStatus(status.to_string()));
        }
        self.with_task(id, |task| {
            task.result.apply_final(patch);
            task.status = status;
            task.updated_at = now();
        })?
        .ok_or(StoreError::TaskNotFound(id))
    }

    async fn append_logs(
        &self,
        id: TaskId,
        lines: Vec<String>,
        window: usize,
    ) -> Result<LogSnapshot, StoreError> {
        self.with_task(id, |task| {
            let mut snapshot = task.result.log_snapshot();
            snapshot.push_lines(lines, window);
            task.result.logs = snapshot.lines.clone();
            task.result.seq = snapshot.seq;
            task.updated_at = now();
            snapshot
        })?
        .ok_or(StoreError::TaskNotFound(id))
    }

    async fn log_snapshot(&self, id: TaskId) -> Result<Option<LogSnapshot>, StoreError> {
        Ok(self
            .tasks
            .read()
            .map_err(poison_err)?
            .get(&id)
            .map(|t| t.result.log_snapshot()))
    }

    async fn pause(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self
            .with_task(id, |task| {
                if !task.status.is_pausable() {
                    return false;
                }
                task.status = TaskStatus::Paused;
                task.updated_at = now();
                true
            })?
            .unwrap_or(false))
    }

    async fn request_retry(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self
            .with_task(id, |task| {
                if !task.status.is_retryable() {
                    return false;
                }
                task.status = TaskStatus::Queued;
                task.retries += 1;
                task.result.apply(&ResultPatch::run_reset());
                task.updated_at = now();
                true
            })?
            .unwrap_or(false))
    }

    async fn set_archived(&self, id: TaskId, archived: bool) -> Result<bool, StoreError> {
        Ok(self
            .with_task(id, |task| {
                task.archived = archived;
                task.updated_at = now();
            })?
            .is_some())
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self.tasks.write().map_err(poison_err)?.remove(&id).is_some())
    }
}
