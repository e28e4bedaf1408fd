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

//! A streaming observer following a task's persisted rolling log.

use serde_json::json;
use taskmill::logs::LogView;
use taskmill::{reconcile, LogDelta, NewTask, ResultPatch, TaskStore};

use crate::fixtures::SqliteFixture;

#[tokio::test]
async fn test_observer_follows_appends_and_evictions() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("build", json!({}))).await.unwrap();
    let window = 3;

    let mut view = LogView::new();
    store
        .append_logs(task.id, vec!["a".into(), "b".into()], window)
        .await
        .unwrap();
    let snapshot = store.log_snapshot(task.id).await.unwrap().unwrap();
    assert!(matches!(view.update(&snapshot), LogDelta::Append { .. }));
    assert_eq!(view.lines(), ["a", "b"]);

    store
        .append_logs(task.id, vec!["c".into()], window)
        .await
        .unwrap();
    let snapshot = store.log_snapshot(task.id).await.unwrap().unwrap();
    assert_eq!(
        view.update(&snapshot),
        LogDelta::Append {
            lines: vec!["c".into()],
            next_seen_seq: 3
        }
    );

    // The observer falls behind by more than the window.
    store
        .append_logs(task.id, (0..5).map(|i| format!("x{}", i)).collect(), window)
        .await
        .unwrap();
    let snapshot = store.log_snapshot(task.id).await.unwrap().unwrap();
    assert!(matches!(view.update(&snapshot), LogDelta::Resync { .. }));
    assert_eq!(view.lines(), ["x2", "x3", "x4"]);
    assert_eq!(view.seen_seq(), 8);

    // A fresh observer catching up in one go ends with the same view.
    let mut late = LogView::new();
    late.update(&snapshot);
    assert_eq!(late, view);
    assert_eq!(reconcile(view.seen_seq(), &snapshot), LogDelta::Noop);
}

#[tokio::test]
async fn test_observer_resyncs_after_run_reset() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;
    let task = store.enqueue(NewTask::new("build", json!({}))).await.unwrap();

    store
        .append_logs(task.id, vec!["old".into()], 10)
        .await
        .unwrap();
    let mut view = LogView::new();
    view.update(&store.log_snapshot(task.id).await.unwrap().unwrap());
    assert_eq!(view.seen_seq(), 1);

    store
        .patch_result(task.id, &ResultPatch::run_reset())
        .await
        .unwrap();
    let snapshot = store.log_snapshot(task.id).await.unwrap().unwrap();
    assert_eq!(
        view.update(&snapshot),
        LogDelta::Resync {
            lines: vec![],
            next_seen_seq: 0
        }
    );
    assert!(view.lines().is_empty());
}
