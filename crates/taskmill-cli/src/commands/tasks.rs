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

//! Task inspection and operator request commands.

use anyhow::{anyhow, Context, Result};
use taskmill::{Task, TaskFilter, TaskStatus, TaskStore};
use tracing::info;

use super::parse_task_id;

pub async fn show(store: &dyn TaskStore, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    let task = store
        .get(id)
        .await
        .context("Failed to load task")?
        .ok_or_else(|| anyhow!("Task {} not found", id))?;

    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

/// Build the list filter from the command flags. Non-archived tasks are the
/// default view.
fn build_filter(status: Option<&str>, archived: bool, all: bool) -> Result<TaskFilter> {
    let status = status
        .map(|s| s.parse::<TaskStatus>())
        .transpose()
        .context("Invalid --status")?;
    let archived = match (archived, all) {
        (_, true) => None,
        (true, false) => Some(true),
        (false, false) => Some(false),
    };
    Ok(TaskFilter { status, archived })
}

fn format_row(task: &Task) -> String {
    format!(
        "{}  {:<10}  {:<5}  {:>3}  {}  {}",
        task.id,
        task.status,
        if task.archived { "yes" } else { "no" },
        task.retries,
        task.created_at.format("%Y-%m-%d %H:%M:%S"),
        task.event_type
    )
}

pub async fn list(
    store: &dyn TaskStore,
    status: Option<&str>,
    archived: bool,
    all: bool,
    limit: usize,
) -> Result<()> {
    let filter = build_filter(status, archived, all)?;
    let tasks = store
        .list(&filter, limit)
        .await
        .context("Failed to list tasks")?;

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:<5}  {:>3}  {:<19}  EVENT",
        "ID", "STATUS", "ARCH", "TRY", "CREATED"
    );
    for task in &tasks {
        println!("{}", format_row(task));
    }
    Ok(())
}

pub async fn pause(store: &dyn TaskStore, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    if store.pause(id).await.context("Failed to pause task")? {
        info!(task_id = %id, "Pause requested");
        println!("Task {} paused", id);
    } else {
        println!("Task {} is missing or not queued/processing; nothing to pause", id);
    }
    Ok(())
}

pub async fn retry(store: &dyn TaskStore, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    if store.request_retry(id).await.context("Failed to re-queue task")? {
        info!(task_id = %id, "Task re-queued");
        println!("Task {} re-queued", id);
    } else {
        println!("Task {} is missing or not failed/paused; nothing to retry", id);
    }
    Ok(())
}

pub async fn archive(store: &dyn TaskStore, id: &str, archived: bool) -> Result<()> {
    let id = parse_task_id(id)?;
    let action = if archived { "archived" } else { "unarchived" };
    if store
        .set_archived(id, archived)
        .await
        .context("Failed to update archived flag")?
    {
        println!("Task {} {}", id, action);
    } else {
        println!("Task {} not found", id);
    }
    Ok(())
}

pub async fn delete(store: &dyn TaskStore, id: &str) -> Result<()> {
    let id = parse_task_id(id)?;
    if store.delete(id).await.context("Failed to delete task")? {
        info!(task_id = %id, "Task deleted");
        println!("Task {} deleted", id);
    } else {
        println!("Task {} not found", id);
    }
    Ok(())
}
