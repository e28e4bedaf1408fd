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

//! # Data Access Layer
//!
//! The [`TaskStore`] trait is the persistence seam of the engine. Two
//! implementations are provided:
//!
//! - [`sqlite::SqliteTaskStore`]: durable, diesel over a single-connection
//!   SQLite pool.
//! - [`memory::InMemoryTaskStore`]: process-local, for tests and development.
//!
//! ## Claiming
//!
//! [`TaskStore::claim_next`] scans a bounded batch of queued, non-archived
//! tasks oldest first, skips the ones whose schedule window is closed, and
//! attempts a conditional `queued -> processing` transition on each remaining
//! candidate. The first transition that affects exactly one row wins. Losing a
//! race to another runner is not an error; the scan simply moves on.

#[cfg(test)]
pub(crate) mod flaky;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::StoreError;
use crate::logs::LogSnapshot;
use crate::models::{ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskStatus};
use crate::schedule::{is_active_at, ScheduleDescriptor};

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

/// Default number of candidates inspected by one claim attempt.
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// Persistence operations needed by the runner, ingestion and operators.
///
/// Every mutation is individually atomic. Operations addressing a task that
/// no longer exists return `Ok(None)` / `Ok(false)` for reads and requests, and
/// [`StoreError::TaskNotFound`] for result writes.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persists a new queued task with an empty result.
    async fn enqueue(&self, new_task: NewTask) -> Result<Task, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Lists tasks matching the filter, oldest first.
    async fn list(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Claims the oldest queued, non-archived task whose schedule is active
    /// at `now`, moving it to `processing`.
    ///
    /// Returns `None` when nothing in the scanned batch is claimable.
    async fn claim_next(
        &self,
        scan_limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<Task>, StoreError>;

    /// Reads the minimal live state polled during execution.
    async fn control_state(&self, id: TaskId) -> Result<Option<ControlState>, StoreError>;

    /// Applies a result patch without touching the status.
    async fn patch_result(&self, id: TaskId, patch: &ResultPatch) -> Result<(), StoreError>;

    /// Applies a result patch and a terminal status in one write.
    async fn finalize(
        &self,
        id: TaskId,
        patch: &ResultPatch,
        status: TaskStatus,
    ) -> Result<(), StoreError>;

    /// Appends lines to the rolling log, keeping at most `window` lines, and
    /// returns the resulting snapshot.
    async fn append_logs(
        &self,
        id: TaskId,
        lines: Vec<String>,
        window: usize,
    ) -> Result<LogSnapshot, StoreError>;

    async fn log_snapshot(&self, id: TaskId) -> Result<Option<LogSnapshot>, StoreError>;

    /// External pause request. Returns whether the task was paused.
    async fn pause(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Re-queues a failed or paused task, incrementing `retries` and clearing
    /// run-scoped result fields. Returns whether the task was re-queued.
    async fn request_retry(&self, id: TaskId) -> Result<bool, StoreError>;

    async fn set_archived(&self, id: TaskId, archived: bool) -> Result<bool, StoreError>;

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError>;
}

/// Returns whether a claim candidate's schedule permits running at `now`.
pub(crate) fn is_claimable(payload: &serde_json::Value, now: &DateTime<FixedOffset>) -> bool {
    let schedule = ScheduleDescriptor::from_payload(payload);
    is_active_at(schedule.as_ref(), now)
}
