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

//! Task record and state operations.
//!
//! Result updates are read-modify-write on the JSON `result` column and run
//! inside a transaction so concurrent writers cannot interleave.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::models::{parse_result, NewTaskRow, TaskRow};
use super::SqliteTaskStore;
use crate::database::schema::tasks;
use crate::database::{creation_timestamp, format_timestamp, now};
use crate::error::StoreError;
use crate::logs::LogSnapshot;
use crate::models::{
    ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskResult, TaskStatus,
};

/// Loads the result of one task, lets `f` modify it, and writes it back
/// together with an optional status change.
fn modify_result<R>(
    conn: &mut SqliteConnection,
    id: TaskId,
    new_status: Option<TaskStatus>,
    f: impl FnOnce(&mut TaskResult) -> R,
) -> Result<R, StoreError> {
    let key = id.to_string();
    conn.transaction::<R, StoreError, _>(|conn| {
        let raw: Option<String> = tasks::table
            .filter(tasks::id.eq(&key))
            .select(tasks::result)
            .first(conn)
            .optional()?;
        let raw = raw.ok_or(StoreError::TaskNotFound(id))?;

        let mut result = parse_result(&key, &raw)?;
        let out = f(&mut result);
        let encoded = serde_json::to_string(&result)?;
        let updated_at = format_timestamp(&now());

        match new_status {
            Some(status) => diesel::update(tasks::table.filter(tasks::id.eq(&key)))
                .set((
                    tasks::result.eq(&encoded),
                    tasks::status.eq(status.as_str()),
                    tasks::updated_at.eq(&updated_at),
                ))
                .execute(conn)?,
            None => diesel::update(tasks::table.filter(tasks::id.eq(&key)))
                .set((
                    tasks::result.eq(&encoded),
                    tasks::updated_at.eq(&updated_at),
                ))
                .execute(conn)?,
        };
        Ok(out)
    })
}

impl SqliteTaskStore {
    pub(super) async fn insert_task(&self, new_task: NewTask) -> Result<Task, StoreError> {
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
        let row = NewTaskRow::from_task(&task)?;

        let conn = self.database.get_connection().await?;
        conn.interact(move |conn| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(task)
    }

    pub(super) async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let row: Option<TaskRow> = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::id.eq(key))
                    .select(TaskRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        row.map(Task::try_from).transpose()
    }

    pub(super) async fn list_tasks(
        &self,
        filter: &TaskFilter,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.database.get_connection().await?;
        let status = filter.status.map(|s| s.as_str());
        let archived = filter.archived;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<TaskRow> = conn
            .interact(move |conn| {
                let mut query = tasks::table
                    .select(TaskRow::as_select())
                    .order((tasks::created_at.asc(), tasks::id.asc()))
                    .limit(limit)
                    .into_boxed();
                if let Some(status) = status {
                    query = query.filter(tasks::status.eq(status));
                }
                if let Some(archived) = archived {
                    query = query.filter(tasks::archived.eq(archived));
                }
                query.load(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Task::try_from).collect()
    }

    pub(super) async fn read_control_state(
        &self,
        id: TaskId,
    ) -> Result<Option<ControlState>, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let row: Option<(String, bool)> = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::id.eq(key))
                    .select((tasks::status, tasks::archived))
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        match row {
            Some((status, archived)) => Ok(Some(ControlState {
                status: status.parse()?,
                archived,
            })),
            None => Ok(None),
        }
    }

    pub(super) async fn write_result(
        &self,
        id: TaskId,
        patch: &ResultPatch,
        status: Option<TaskStatus>,
    ) -> Result<(), StoreError> {
        if let Some(status) = status {
            if !status.is_terminal() {
                return Err(StoreError::InvalidStatus(status.to_string()));
            }
        }
        let conn = self.database.get_connection().await?;
        let patch = patch.clone();
        conn.interact(move |conn| {
            modify_result(conn, id, status, |result| match status {
                Some(_) => result.apply_final(&patch),
                None => result.apply(&patch),
            })
        })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?
    }

    pub(super) async fn append_log_lines(
        &self,
        id: TaskId,
        lines: Vec<String>,
        window: usize,
    ) -> Result<LogSnapshot, StoreError> {
        let conn = self.database.get_connection().await?;
        conn.interact(move |conn| {
            modify_result(conn, id, None, |result| {
                let mut snapshot = result.log_snapshot();
                snapshot.push_lines(lines, window);
                result.logs = snapshot.lines.clone();
                result.seq = snapshot.seq;
                snapshot
            })
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))?
    }

    pub(super) async fn read_log_snapshot(
        &self,
        id: TaskId,
    ) -> Result<Option<LogSnapshot>, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let raw: Option<String> = conn
            .interact({
                let key = key.clone();
                move |conn| {
                    tasks::table
                        .filter(tasks::id.eq(key))
                        .select(tasks::result)
                        .first(conn)
                        .optional()
                }
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        raw.map(|raw| parse_result(&key, &raw).map(|r| r.log_snapshot()))
            .transpose()
    }

    pub(super) async fn pause_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table)
                    .filter(tasks::id.eq(key))
                    .filter(tasks::status.eq_any([
                        TaskStatus::Queued.as_str(),
                        TaskStatus::Processing.as_str(),
                    ]))
                    .set((
                        tasks::status.eq(TaskStatus::Paused.as_str()),
                        tasks::updated_at.eq(format_timestamp(&now())),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    pub(super) async fn requeue_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        conn.interact(move |conn| {
            conn.transaction::<bool, StoreError, _>(|conn| {
                let row: Option<(String, String)> = tasks::table
                    .filter(tasks::id.eq(&key))
                    .select((tasks::status, tasks::result))
                    .first(conn)
                    .optional()?;
                let Some((status, raw)) = row else {
                    return Ok(false);
                };
                if !status.parse::<TaskStatus>()?.is_retryable() {
                    return Ok(false);
                }

                let mut result = parse_result(&key, &raw)?;
                result.apply(&ResultPatch::run_reset());
                diesel::update(tasks::table.filter(tasks::id.eq(&key)))
                    .set((
                        tasks::status.eq(TaskStatus::Queued.as_str()),
                        tasks::retries.eq(tasks::retries + 1),
                        tasks::result.eq(serde_json::to_string(&result)?),
                        tasks::updated_at.eq(format_timestamp(&now())),
                    ))
                    .execute(conn)?;
                Ok(true)
            })
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))?
    }

    pub(super) async fn update_archived(
        &self,
        id: TaskId,
        archived: bool,
    ) -> Result<bool, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let updated = conn
            .interact(move |conn| {
                diesel::update(tasks::table.filter(tasks::id.eq(key)))
                    .set((
                        tasks::archived.eq(archived),
                        tasks::updated_at.eq(format_timestamp(&now())),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    pub(super) async fn delete_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let conn = self.database.get_connection().await?;
        let key = id.to_string();
        let deleted = conn
            .interact(move |conn| {
                diesel::delete(tasks::table.filter(tasks::id.eq(key))).execute(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(deleted == 1)
    }
}
