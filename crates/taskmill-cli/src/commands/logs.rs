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

//! Implementation of the `logs` command.
//!
//! The command behaves like any other streaming observer: it remembers the
//! last sequence number it printed and asks [`reconcile`] what changed.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use taskmill::{reconcile, LogDelta, LogSnapshot, TaskId, TaskStore};

use super::parse_task_id;

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Marker printed when the consumer must discard what it has shown.
const RESYNC_MARKER: &str = "--- log window moved, showing retained lines ---";

/// Lines to print for a delta, and the new last-seen sequence number.
fn render(seen_seq: u64, snapshot: &LogSnapshot) -> (Vec<String>, u64) {
    match reconcile(seen_seq, snapshot) {
        LogDelta::Noop => (Vec::new(), seen_seq),
        LogDelta::Append {
            lines,
            next_seen_seq,
        } => (lines, next_seen_seq),
        LogDelta::Resync {
            lines,
            next_seen_seq,
        } => {
            let mut out = Vec::with_capacity(lines.len() + 1);
            if seen_seq > 0 || !lines.is_empty() {
                out.push(RESYNC_MARKER.to_string());
            }
            out.extend(lines);
            (out, next_seen_seq)
        }
    }
}

async fn snapshot(store: &dyn TaskStore, id: TaskId) -> Result<Option<LogSnapshot>> {
    store
        .log_snapshot(id)
        .await
        .context("Failed to read task logs")
}

pub async fn run(store: &dyn TaskStore, id: &str, since: u64, follow: bool) -> Result<()> {
    let id = parse_task_id(id)?;
    let first = snapshot(store, id)
        .await?
        .ok_or_else(|| anyhow!("Task {} not found", id))?;

    let (lines, mut seen_seq) = render(since, &first);
    for line in lines {
        println!("{}", line);
    }

    if !follow {
        return Ok(());
    }

    loop {
        tokio::time::sleep(FOLLOW_POLL_INTERVAL).await;

        // Status is read before the logs: a terminal result is written in one
        // step with its final logs, so the snapshot taken next is complete.
        let Some(state) = store
            .control_state(id)
            .await
            .context("Failed to read task state")?
        else {
            println!("--- task deleted ---");
            return Ok(());
        };
        let Some(current) = snapshot(store, id).await? else {
            println!("--- task deleted ---");
            return Ok(());
        };

        let (lines, next) = render(seen_seq, &current);
        for line in lines {
            println!("{}", line);
        }
        seen_seq = next;

        if state.status.is_terminal() {
            println!("--- task {} ---", state.status);
            return Ok(());
        }
    }
}
