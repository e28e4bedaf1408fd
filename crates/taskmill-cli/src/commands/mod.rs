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

//! Subcommand implementations.

pub mod enqueue;
pub mod logs;
pub mod run;
pub mod tasks;

use anyhow::{Context, Result};
use taskmill::TaskId;

pub(crate) fn parse_task_id(raw: &str) -> Result<TaskId> {
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid task id: '{}'", raw))
}
