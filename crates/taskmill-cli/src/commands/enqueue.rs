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

//! Implementation of the `enqueue` command.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use taskmill::schedule::{ScheduleSource, SCHEDULE_KEY};
use taskmill::{NewTask, ScheduleDescriptor, TaskStore};
use tracing::info;

/// Parse an hour window like "9-17" or "22-2".
fn parse_window(s: &str) -> Result<(u32, u32)> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| anyhow!("Window '{}' must look like START-END, e.g. 22-2", s))?;

    let parse_hour = |raw: &str| -> Result<u32> {
        let hour: u32 = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid hour in window: '{}'", raw))?;
        if hour > 23 {
            bail!("Hour {} is out of range (0-23)", hour);
        }
        Ok(hour)
    };

    Ok((parse_hour(start)?, parse_hour(end)?))
}

fn parse_source(s: &str) -> Result<ScheduleSource> {
    serde_json::from_value(Value::String(s.trim().to_lowercase()))
        .with_context(|| format!("Invalid schedule source: '{}'", s))
}

/// Build the payload, embedding a schedule descriptor when a window is given.
fn build_payload(raw: &str, window: Option<&str>, source: Option<&str>) -> Result<Value> {
    let mut payload: Value = serde_json::from_str(raw).context("Payload is not valid JSON")?;

    if let Some(window) = window {
        let (start, end) = parse_window(window)?;
        let mut descriptor = ScheduleDescriptor::window(start, end);
        if let Some(source) = source {
            descriptor = descriptor.with_source(parse_source(source)?);
        }
        let object = payload
            .as_object_mut()
            .ok_or_else(|| anyhow!("A schedule window requires a JSON object payload"))?;
        object.insert(SCHEDULE_KEY.to_string(), serde_json::to_value(descriptor)?);
    }

    Ok(payload)
}

pub async fn run(
    store: &dyn TaskStore,
    event_type: &str,
    payload: &str,
    group: Option<String>,
    window: Option<&str>,
    source: Option<&str>,
) -> Result<()> {
    let payload = build_payload(payload, window, source)?;
    let mut new_task = NewTask::new(event_type, payload);
    if let Some(group) = group {
        new_task = new_task.with_group(group);
    }

    let task = store
        .enqueue(new_task)
        .await
        .context("Failed to enqueue task")?;
    info!(task_id = %task.id, event_type = %task.event_type, "Task queued");
    println!("{}", task.id);
    Ok(())
}
