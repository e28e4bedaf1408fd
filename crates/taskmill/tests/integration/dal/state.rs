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

//! Record, result and operator-request tests on the SQLite store.

use serde_json::json;
use taskmill::{
    ControlState, NewTask, ResultPatch, StoreError, TaskFilter, TaskId, TaskStatus, TaskStore,
};

use crate::fixtures::{at_hour, SqliteFixture};

#[tokio::test]
async fn test_enqueue_round_trips_record() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let task = store
        .enqueue(NewTask::new("push", json!({"repo": "acme/api"})).with_group("acme"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.retries, 0);
    assert!(!task.archived);

    let loaded = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(loaded, task);
    assert!(store.get(TaskId::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_filters_and_orders() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let a = store.enqueue(NewTask::new("a", json!({}))).await.unwrap();
    let b = store.enqueue(NewTask::new("b", json!({}))).await.unwrap();
    let c = store.enqueue(NewTask::new("c", json!({}))).await.unwrap();
    store.set_archived(b.id, true).await.unwrap();
    store.claim_next(50, at_hour(12)).await.unwrap();

    let all = store.list(&TaskFilter::default(), 10).await.unwrap();
    let ids: Vec<_> = all.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);

    let active = TaskFilter {
        archived: Some(false),
        ..TaskFilter::default()
    };
    let ids: Vec<_> = store.list(&active, 10).await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![a.id, c.id]);

    let queued = TaskFilter {
        status: Some(TaskStatus::Queued),
        archived: Some(false),
    };
    let ids: Vec<_> = store.list(&queued, 10).await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![c.id]);

    assert_eq!(store.list(&TaskFilter::default(), 2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_finalize_writes_result_and_status_together() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    store.claim_next(50, at_hour(12)).await.unwrap();

    let mut patch = ResultPatch::default().with_message("compile error");
    patch.logs = Some(vec!["a".into(), "b".into()]);
    patch.seq = Some(7);
    patch.provider_ref = Some("run-42".into());
    patch.extra.insert("attempt".into(), json!(1));
    store.finalize(task.id, &patch, TaskStatus::Failed).await.unwrap();

    let task = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.result.message.as_deref(), Some("compile error"));
    assert_eq!(task.result.logs, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(task.result.seq, 7);
    assert_eq!(task.result.provider_ref.as_deref(), Some("run-42"));
    assert_eq!(task.result.extra["attempt"], json!(1));
}

#[tokio::test]
async fn test_finalize_never_rewinds_streamed_seq() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    store.claim_next(50, at_hour(12)).await.unwrap();

    let lines: Vec<String> = (1..=10).map(|i| format!("line {i}")).collect();
    store.append_logs(task.id, lines.clone(), 100).await.unwrap();

    let mut patch = ResultPatch::default();
    patch.logs = Some(lines[7..].to_vec());
    patch.seq = Some(3);
    store.finalize(task.id, &patch, TaskStatus::Succeeded).await.unwrap();

    let snapshot = store.log_snapshot(task.id).await.unwrap().unwrap();
    assert_eq!(snapshot.seq, 10);
    assert_eq!(snapshot.lines, lines[7..].to_vec());
    assert!(snapshot.is_consistent());

    // Non-terminal patches still write seq as given.
    store.patch_result(task.id, &ResultPatch::run_reset()).await.unwrap();
    assert_eq!(store.log_snapshot(task.id).await.unwrap().unwrap().seq, 0);
}

#[tokio::test]
async fn test_result_writes_report_missing_tasks() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    assert!(store.delete(task.id).await.unwrap());
    assert!(!store.delete(task.id).await.unwrap());

    let err = store
        .finalize(task.id, &ResultPatch::default(), TaskStatus::Succeeded)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = store
        .patch_result(task.id, &ResultPatch::run_reset())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.control_state(task.id).await.unwrap().is_none());
    assert!(store.log_snapshot(task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_finalize_rejects_non_terminal_status() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    let err = store
        .finalize(task.id, &ResultPatch::default(), TaskStatus::Queued)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidStatus(_)));
    assert_eq!(
        store.get(task.id).await.unwrap().unwrap().status,
        TaskStatus::Queued
    );
}

#[tokio::test]
async fn test_append_logs_keeps_rolling_window() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    let snapshot = store
        .append_logs(task.id, vec!["a".into(), "b".into()], 3)
        .await
        .unwrap();
    assert_eq!(snapshot.seq, 2);

    let snapshot = store
        .append_logs(task.id, vec!["c".into(), "d".into()], 3)
        .await
        .unwrap();
    assert_eq!(snapshot.lines, vec!["b", "c", "d"]);
    assert_eq!(snapshot.seq, 4);
    assert_eq!(store.log_snapshot(task.id).await.unwrap(), Some(snapshot));

    let err = store
        .append_logs(TaskId::new_v4(), vec!["x".into()], 3)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_pause_only_applies_to_live_tasks() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let queued = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    let done = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    store
        .finalize(done.id, &ResultPatch::default(), TaskStatus::Succeeded)
        .await
        .unwrap();

    assert!(store.pause(queued.id).await.unwrap());
    assert_eq!(
        store.control_state(queued.id).await.unwrap(),
        Some(ControlState {
            status: TaskStatus::Paused,
            archived: false
        })
    );
    assert!(!store.pause(queued.id).await.unwrap());
    assert!(!store.pause(done.id).await.unwrap());
    assert!(!store.pause(TaskId::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_request_retry_requeues_and_resets_run_fields() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    // Not retryable while queued.
    assert!(!store.request_retry(task.id).await.unwrap());

    store.claim_next(50, at_hour(12)).await.unwrap();
    let mut patch = ResultPatch::default().with_message("boom");
    patch.logs = Some(vec!["line".into()]);
    patch.seq = Some(1);
    patch.output = Some("partial".into());
    patch.provider_ref = Some("run-1".into());
    store.finalize(task.id, &patch, TaskStatus::Failed).await.unwrap();

    assert!(store.request_retry(task.id).await.unwrap());
    let task = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.retries, 1);
    assert!(task.result.logs.is_empty());
    assert_eq!(task.result.seq, 0);
    assert!(task.result.output.is_empty());
    assert!(task.result.message.is_none());
    // Provider references survive a retry.
    assert_eq!(task.result.provider_ref.as_deref(), Some("run-1"));

    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_some());
}
