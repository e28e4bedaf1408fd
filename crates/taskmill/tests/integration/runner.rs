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

//! End-to-end runner tests on SQLite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use taskmill::executor::{ExecutionFailure, ExecutionOutput, TaskExecutor};
use taskmill::runner::PAUSED_MESSAGE;
use taskmill::schedule::ScheduleDescriptor;
use taskmill::{
    NewTask, RunnerConfig, Task, TaskId, TaskRunner, TaskStatus, TaskStore, TriggerOutcome,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::fixtures::SqliteFixture;

fn config() -> RunnerConfig {
    RunnerConfig::builder()
        .control_poll_interval(Duration::from_millis(20))
        .finalize_base_delay(Duration::from_millis(1))
        .finalize_max_delay(Duration::from_millis(10))
        .log_window(4)
        .build()
}

/// Streams a few log lines through the store, then succeeds or fails
/// depending on the payload.
struct ScriptedExecutor {
    store: Arc<dyn TaskStore>,
    order: Mutex<Vec<TaskId>>,
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        task: &Task,
        _cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionFailure> {
        self.order.lock().push(task.id);
        let lines: Vec<String> = (1..=6).map(|i| format!("{} line {}", task.event_type, i)).collect();
        let snapshot = self
            .store
            .append_logs(task.id, lines, 4)
            .await
            .map_err(|e| ExecutionFailure::new(e.to_string()))?;

        if task.payload["fail"] == json!(true) {
            return Err(ExecutionFailure::new("step 3 failed").with_logs(snapshot.lines, snapshot.seq));
        }
        Ok(ExecutionOutput {
            logs: snapshot.lines,
            seq: snapshot.seq,
            output: "done".into(),
            provider_ref: Some(format!("ci-{}", task.event_type)),
            ..ExecutionOutput::default()
        })
    }
}

/// Signals when it starts, then waits for cancellation.
struct WaitingExecutor {
    started: Arc<Notify>,
}

#[async_trait]
impl TaskExecutor for WaitingExecutor {
    async fn execute(
        &self,
        _task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionFailure> {
        self.started.notify_one();
        cancel.cancelled().await;
        Err(ExecutionFailure::aborted("stopped").with_logs(vec!["halfway".into()], 1))
    }
}

#[tokio::test]
async fn test_drain_executes_everything_in_order() {
    let fixture = SqliteFixture::new().await;
    let store: Arc<dyn TaskStore> = fixture.store.clone();

    let ok = store.enqueue(NewTask::new("lint", json!({}))).await.unwrap();
    let bad = store
        .enqueue(NewTask::new("test", json!({"fail": true})))
        .await
        .unwrap();
    let night = store
        .enqueue(NewTask::new(
            "deploy",
            json!({ "schedule": ScheduleDescriptor::window(3, 3).with_source(
                taskmill::schedule::ScheduleSource::Robot
            ) }),
        ))
        .await
        .unwrap();

    let executor = Arc::new(ScriptedExecutor {
        store: store.clone(),
        order: Mutex::new(Vec::new()),
    });
    let runner = TaskRunner::new(store.clone(), executor.clone(), config());

    assert_eq!(runner.trigger().await, TriggerOutcome::Drained { passes: 1 });
    assert_eq!(*executor.order.lock(), vec![ok.id, bad.id, night.id]);

    let ok = store.get(ok.id).await.unwrap().unwrap();
    assert_eq!(ok.status, TaskStatus::Succeeded);
    assert_eq!(ok.result.seq, 6);
    assert_eq!(ok.result.logs.len(), 4);
    assert_eq!(ok.result.logs.last().map(String::as_str), Some("lint line 6"));
    assert_eq!(ok.result.provider_ref.as_deref(), Some("ci-lint"));
    assert!(ok.result.message.is_none());

    let bad = store.get(bad.id).await.unwrap().unwrap();
    assert_eq!(bad.status, TaskStatus::Failed);
    assert_eq!(bad.result.message.as_deref(), Some("step 3 failed"));
    assert_eq!(bad.result.seq, 6);

    assert_eq!(
        store.get(night.id).await.unwrap().unwrap().status,
        TaskStatus::Succeeded
    );
}

#[tokio::test]
async fn test_retried_task_runs_with_fresh_logs() {
    let fixture = SqliteFixture::new().await;
    let store: Arc<dyn TaskStore> = fixture.store.clone();
    let task = store
        .enqueue(NewTask::new("test", json!({"fail": true})))
        .await
        .unwrap();

    let executor = Arc::new(ScriptedExecutor {
        store: store.clone(),
        order: Mutex::new(Vec::new()),
    });
    let runner = TaskRunner::new(store.clone(), executor, config());
    runner.trigger().await;
    assert!(store.request_retry(task.id).await.unwrap());
    runner.trigger().await;

    let task = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retries, 1);
    // The second run started counting from zero again.
    assert_eq!(task.result.seq, 6);
}

#[tokio::test]
async fn test_external_pause_stops_running_task() {
    let fixture = SqliteFixture::new().await;
    let store: Arc<dyn TaskStore> = fixture.store.clone();
    let task = store.enqueue(NewTask::new("build", json!({}))).await.unwrap();

    let started = Arc::new(Notify::new());
    let executor = Arc::new(WaitingExecutor {
        started: started.clone(),
    });
    let runner = TaskRunner::new(store.clone(), executor, config());
    let drain = runner.spawn_trigger();

    started.notified().await;
    assert!(store.pause(task.id).await.unwrap());

    let outcome = tokio::time::timeout(Duration::from_secs(5), drain)
        .await
        .expect("runner did not observe the pause")
        .unwrap();
    assert_eq!(outcome, TriggerOutcome::Drained { passes: 1 });

    let task = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.result.message.as_deref(), Some(PAUSED_MESSAGE));
    assert_eq!(task.result.logs, vec!["halfway".to_string()]);
}

#[tokio::test]
async fn test_external_delete_stops_running_task_without_write() {
    let fixture = SqliteFixture::new().await;
    let store: Arc<dyn TaskStore> = fixture.store.clone();
    let task = store.enqueue(NewTask::new("build", json!({}))).await.unwrap();
    let next = store.enqueue(NewTask::new("build", json!({}))).await.unwrap();

    let started = Arc::new(Notify::new());
    let executor = Arc::new(WaitingExecutor {
        started: started.clone(),
    });
    let runner = TaskRunner::new(store.clone(), executor, config());
    let drain = runner.spawn_trigger();

    started.notified().await;
    assert!(store.delete(task.id).await.unwrap());

    // The second task blocks too; pause it so the drain can finish.
    started.notified().await;
    assert!(store.pause(next.id).await.unwrap());

    tokio::time::timeout(Duration::from_secs(5), drain)
        .await
        .expect("runner did not observe the delete")
        .unwrap();

    assert!(store.get(task.id).await.unwrap().is_none());
    assert_eq!(
        store.get(next.id).await.unwrap().unwrap().status,
        TaskStatus::Paused
    );
}
