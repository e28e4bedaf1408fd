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

//! Shell command executor used by `taskmill run`.
//!
//! A task names its command in the payload, either as an argv array or as a
//! string handed to `sh -c`:
//!
//! ```json
//! {"command": ["cargo", "test"]}
//! {"command": "make lint && make test"}
//! ```
//!
//! Output lines are appended to the task's rolling log while the child runs,
//! so `taskmill logs --follow` can watch them.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use taskmill::executor::{ExecutionFailure, ExecutionOutput, TaskExecutor};
use taskmill::logs::RollingLog;
use taskmill::{Task, TaskId, TaskStore};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMMAND_KEY: &str = "command";

/// Lines forwarded to the store in one append.
const MAX_BATCH: usize = 64;

pub struct ShellExecutor {
    store: Arc<dyn TaskStore>,
    log_window: usize,
}

impl ShellExecutor {
    pub fn new(store: Arc<dyn TaskStore>, log_window: usize) -> Self {
        Self { store, log_window }
    }

    async fn publish(&self, task_id: TaskId, lines: Vec<String>) {
        if let Err(e) = self.store.append_logs(task_id, lines, self.log_window).await {
            warn!(task_id = %task_id, error = %e, "Failed to append command output");
        }
    }
}

/// Extract the argv for a task.
fn command_of(payload: &Value) -> Result<Vec<String>, ExecutionFailure> {
    match payload.get(COMMAND_KEY) {
        Some(Value::String(script)) if !script.trim().is_empty() => {
            Ok(vec!["sh".into(), "-c".into(), script.clone()])
        }
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ExecutionFailure::new("Command array must contain only strings")
                })
            })
            .collect(),
        Some(_) => Err(ExecutionFailure::new("Command must be a non-empty string or array")),
        None => Err(ExecutionFailure::new("Task payload has no command")),
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

fn exit_extra(code: Option<i32>) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("exitCode".into(), json!(code));
    extra
}

async fn kill(child: &mut Child, task_id: TaskId) {
    if let Err(e) = child.kill().await {
        warn!(task_id = %task_id, error = %e, "Failed to kill command");
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionFailure> {
        let argv = command_of(&task.payload)?;
        debug!(task_id = %task.id, command = ?argv, "Spawning command");

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionFailure::new(format!("Failed to start '{}': {}", argv[0], e)))?;

        let (tx, mut rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let mut log = RollingLog::new(self.log_window);
        loop {
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    kill(&mut child, task.id).await;
                    let (lines, seq) = log.into_parts();
                    return Err(ExecutionFailure::aborted("Command cancelled").with_logs(lines, seq));
                }
                line = rx.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };

            let mut batch = vec![first];
            while batch.len() < MAX_BATCH {
                match rx.try_recv() {
                    Ok(line) => batch.push(line),
                    Err(_) => break,
                }
            }
            log.extend(batch.iter().cloned());
            self.publish(task.id, batch).await;
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill(&mut child, task.id).await;
                let (lines, seq) = log.into_parts();
                return Err(ExecutionFailure::aborted("Command cancelled").with_logs(lines, seq));
            }
            status = child.wait() => status,
        };

        let (lines, seq) = log.into_parts();
        let status = status.map_err(|e| {
            ExecutionFailure::new(format!("Failed to wait for command: {}", e))
                .with_logs(lines.clone(), seq)
        })?;

        if status.success() {
            Ok(ExecutionOutput {
                logs: lines,
                seq,
                extra: exit_extra(status.code()),
                ..ExecutionOutput::default()
            })
        } else {
            let mut failure =
                ExecutionFailure::new(format!("Command exited with {}", status)).with_logs(lines, seq);
            failure.extra = exit_extra(status.code());
            Err(failure)
        }
    }
}
