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

//! Store wrapper that injects finalize failures, for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use super::{InMemoryTaskStore, TaskStore};
use crate::error::StoreError;
use crate::logs::LogSnapshot;
use crate::models::{ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskStatus};

#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryTaskStore,
    failures_left: AtomicU32,
    finalize_calls: AtomicU32,
}

impl FlakyStore {
    /// Fails the next `failures` finalize calls with a pool error.
    pub fn failing_finalize(failures: u32) -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            failures_left: AtomicU32::new(failures),
            finalize_calls: AtomicU32::new(0),
        }
    }

    pub fn finalize_calls(&self) -> u32 {
        self.finalize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn enqueue(&self, new_task: NewTask) -> Result<Task, StoreError> {
        self.inner.enqueue(new_task).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.inner.list(filter, limit).await
    }

    async fn claim_next(
        &self,
        scan_limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<Task>, StoreError> {
        self.inner.claim_next(scan_limit, now).await
    }

    async fn control_state(&self, id: TaskId) -> Result<Option<ControlState>, StoreError> {
        self.inner.control_state(id).await
    }

    async fn patch_result(&self, id: TaskId, patch: &ResultPatch) -> Result<(), StoreError> {
        self.inner.patch_result(id, patch).await
    }

    async fn finalize(
        &self,
        id: TaskId,
        patch: &ResultPatch,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::ConnectionPool("injected failure".into()));
        }
        self.inner.finalize(id, patch, status).await
    }

    async fn append_logs(
        &self,
        id: TaskId,
        lines: Vec<String>,
        window: usize,
    ) -> Result<LogSnapshot, StoreError> {
        self.inner.append_logs(id, lines, window).await
    }

    async fn log_snapshot(&self, id: TaskId) -> Result<Option<LogSnapshot>, StoreError> {
        self.inner.log_snapshot(id).await
    }

    async fn pause(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.pause(id).await
    }

    async fn request_retry(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.request_retry(id).await
    }

    async fn set_archived(&self, id: TaskId, archived: bool) -> Result<bool, StoreError> {
        self.inner.set_archived(id, archived).await
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }
}
