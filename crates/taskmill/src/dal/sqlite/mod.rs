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

//! SQLite-backed task store.
//!
//! Operations are split by concern:
//! - `claiming`: the schedule-aware claim scan
//! - `state`: record reads, result writes and operator requests

mod claiming;
pub mod models;
mod state;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use super::TaskStore;
use crate::database::Database;
use crate::error::StoreError;
use crate::logs::LogSnapshot;
use crate::models::{ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskStatus};

/// Durable [`TaskStore`] on a SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteTaskStore {
    database: Database,
}

impl SqliteTaskStore {
    /// Wraps an already migrated database.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Opens the database, runs migrations and returns the store.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        Ok(Self::new(Database::connect(connection_string).await?))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn enqueue(&self, new_task: NewTask) -> Result<Task, StoreError> {
        self.insert_task(new_task).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.get_task(id).await
    }

    async fn list(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.list_tasks(filter, limit).await
    }

    async fn claim_next(
        &self,
        scan_limit: usize,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<Task>, StoreError> {
        self.claim_next_task(scan_limit, now).await
    }

    async fn control_state(&self, id: TaskId) -> Result<Option<ControlState>, StoreError> {
        self.read_control_state(id).await
    }

    async fn patch_result(&self, id: TaskId, patch: &ResultPatch) -> Result<(), StoreError> {
        self.write_result(id, patch, None).await
    }

    async fn finalize(
        &self,
        id: TaskId,
        patch: &ResultPatch,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        self.write_result(id, patch, Some(status)).await
    }

    async fn append_logs(
        &self,
        id: TaskId,
        lines: Vec<String>,
        window: usize,
    ) -> Result<LogSnapshot, StoreError> {
        self.append_log_lines(id, lines, window).await
    }

    async fn log_snapshot(&self, id: TaskId) -> Result<Option<LogSnapshot>, StoreError> {
        self.read_log_snapshot(id).await
    }

    async fn pause(&self, id: TaskId) -> Result<bool, StoreError> {
        self.pause_task(id).await
    }

    async fn request_retry(&self, id: TaskId) -> Result<bool, StoreError> {
        self.requeue_task(id).await
    }

    async fn set_archived(&self, id: TaskId, archived: bool) -> Result<bool, StoreError> {
        self.update_archived(id, archived).await
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.delete_task(id).await
    }
}
