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

//! Task domain types.
//!
//! These are API-level types; the SQLite backend keeps its own row models and
//! converts at the DAL boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::result::TaskResult;
use crate::error::StoreError;
use crate::schedule::ScheduleDescriptor;

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TaskId)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Lifecycle status of a task. A task is in exactly one status at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Paused => "paused",
        }
    }

    /// Statuses the result finalizer is allowed to write.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Paused
        )
    }

    /// Statuses from which an external pause request is honored.
    pub fn is_pausable(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Processing)
    }

    /// Statuses from which an explicit retry request re-queues the task.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Paused)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A persisted unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_id: Option<String>,
    pub event_type: String,
    pub status: TaskStatus,
    pub archived: bool,
    /// Opaque payload; may embed a schedule descriptor under `"schedule"`.
    pub payload: serde_json::Value,
    pub retries: i32,
    pub result: TaskResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// The schedule descriptor embedded in the payload, if any.
    pub fn schedule(&self) -> Option<ScheduleDescriptor> {
        ScheduleDescriptor::from_payload(&self.payload)
    }

    pub fn control_state(&self) -> ControlState {
        ControlState {
            status: self.status,
            archived: self.archived,
        }
    }
}

/// Structure for creating new task records (ingestion side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub group_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewTask {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            group_id: None,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Minimal live projection of a task, re-read while it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub status: TaskStatus,
    pub archived: bool,
}

/// Listing filter used by operators and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub archived: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| s == task.status)
            && self.archived.map_or(true, |a| a == task.archived)
    }
}
