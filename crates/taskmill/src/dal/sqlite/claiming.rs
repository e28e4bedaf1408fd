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

//! Task claiming.
//!
//! The candidate scan and the conditional transition run inside one pooled
//! interaction. The transition is guarded by `status = 'queued' AND
//! archived = false`, so a runner sharing the database file that got there
//! first leaves this update affecting zero rows and the scan continues.

use chrono::{DateTime, FixedOffset};
use diesel::prelude::*;
use tracing::{debug, warn};

use super::models::TaskRow;
use super::SqliteTaskStore;
use crate::dal::is_claimable;
use crate::database::schema::tasks;
use crate::database::{format_timestamp, now};
use crate::error::StoreError;
use crate::models::{Task, TaskStatus};

impl SqliteTaskStore {
    pub(super) async fn claim_next_task(
        &self,
        scan_limit: usize,
        now_local: DateTime<FixedOffset>,
    ) -> Result<Option<Task>, StoreError> {
        let conn = self.database.get_connection().await?;
        let limit = i64::try_from(scan_limit).unwrap_or(i64::MAX);

        let claimed: Option<TaskRow> = conn
            .interact(move |conn| -> Result<Option<TaskRow>, StoreError> {
                let candidates: Vec<TaskRow> = tasks::table
                    .filter(tasks::status.eq(TaskStatus::Queued.as_str()))
                    .filter(tasks::archived.eq(false))
                    .order((tasks::created_at.asc(), tasks::id.asc()))
                    .limit(limit)
                    .select(TaskRow::as_select())
                    .load(conn)?;

                for row in candidates {
                    let payload: serde_json::Value = match serde_json::from_str(&row.payload) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(task_id = %row.id, error = %e, "Skipping task with unreadable payload");
                            continue;
                        }
                    };
                    if !is_claimable(&payload, &now_local) {
                        debug!(task_id = %row.id, "Skipping task outside its schedule window");
                        continue;
                    }

                    let claimed_at = format_timestamp(&now());
                    let updated = diesel::update(tasks::table)
                        .filter(tasks::id.eq(&row.id))
                        .filter(tasks::status.eq(TaskStatus::Queued.as_str()))
                        .filter(tasks::archived.eq(false))
                        .set((
                            tasks::status.eq(TaskStatus::Processing.as_str()),
                            tasks::updated_at.eq(&claimed_at),
                        ))
                        .execute(conn)?;

                    if updated == 1 {
                        return Ok(Some(TaskRow {
                            status: TaskStatus::Processing.as_str().to_string(),
                            updated_at: claimed_at,
                            ..row
                        }));
                    }
                    debug!(task_id = %row.id, "Lost claim race, continuing scan");
                }
                Ok(None)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        claimed.map(Task::try_from).transpose()
    }
}
