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

//! Row models for the `tasks` table and their conversion to domain types.

use diesel::prelude::*;

use crate::database::schema::tasks;
use crate::database::{format_timestamp, parse_timestamp};
use crate::error::StoreError;
use crate::models::{Task, TaskId, TaskResult, TaskStatus};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRow {
    pub id: String,
    pub group_id: Option<String>,
    pub event_type: String,
    pub status: String,
    pub archived: bool,
    pub payload: String,
    pub retries: i32,
    pub result: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    pub id: String,
    pub group_id: Option<String>,
    pub event_type: String,
    pub status: String,
    pub archived: bool,
    pub payload: String,
    pub retries: i32,
    pub result: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NewTaskRow {
    pub fn from_task(task: &Task) -> Result<Self, StoreError> {
        Ok(Self {
            id: task.id.to_string(),
            group_id: task.group_id.clone(),
            event_type: task.event_type.clone(),
            status: task.status.as_str().to_string(),
            archived: task.archived,
            payload: serde_json::to_string(&task.payload)?,
            retries: task.retries,
            result: serde_json::to_string(&task.result)?,
            created_at: format_timestamp(&task.created_at),
            updated_at: format_timestamp(&task.updated_at),
        })
    }
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRecord {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

pub fn parse_result(id: &str, raw: &str) -> Result<TaskResult, StoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(id, format!("result: {e}")))
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id: TaskId = row
            .id
            .parse()
            .map_err(|e| corrupt(&row.id, format!("id: {e}")))?;
        let status: TaskStatus = row.status.parse()?;
        let payload = serde_json::from_str(&row.payload)
            .map_err(|e| corrupt(&row.id, format!("payload: {e}")))?;
        let result = parse_result(&row.id, &row.result)?;
        let created_at = parse_timestamp(&row.created_at)
            .map_err(|e| corrupt(&row.id, format!("created_at: {e}")))?;
        let updated_at = parse_timestamp(&row.updated_at)
            .map_err(|e| corrupt(&row.id, format!("updated_at: {e}")))?;

        Ok(Task {
            id,
            group_id: row.group_id,
            event_type: row.event_type,
            status,
            archived: row.archived,
            payload,
            retries: row.retries,
            result,
            created_at,
            updated_at,
        })
    }
}
