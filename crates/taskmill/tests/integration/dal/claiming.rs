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

//! Claim tests: ordering, schedule windows, archived exclusion and
//! exclusivity under concurrent claimers.

use std::collections::HashSet;
use std::sync::Arc;

use diesel::prelude::*;
use serde_json::json;
use taskmill::schedule::ScheduleDescriptor;
use taskmill::{NewTask, StoreError, TaskId, TaskStatus, TaskStore};
use tokio::sync::Barrier;

use crate::fixtures::{at_hour, SqliteFixture};

fn windowed(start: u32, end: u32) -> serde_json::Value {
    json!({ "schedule": ScheduleDescriptor::window(start, end) })
}

#[tokio::test]
async fn test_claims_oldest_first_and_marks_processing() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let first = store.enqueue(NewTask::new("push", json!({"n": 1}))).await.unwrap();
    let second = store.enqueue(NewTask::new("push", json!({"n": 2}))).await.unwrap();

    let claimed = store.claim_next(50, at_hour(12)).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, TaskStatus::Processing);

    let persisted = store.get(first.id).await.unwrap().unwrap();
    assert_eq!(persisted.status, TaskStatus::Processing);

    let claimed = store.claim_next(50, at_hour(12)).await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);
    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_schedule_window_blocks_until_open() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let nightly = store.enqueue(NewTask::new("nightly", windowed(22, 2))).await.unwrap();

    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_none());
    let task = store.get(nightly.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);

    let claimed = store.claim_next(50, at_hour(23)).await.unwrap().unwrap();
    assert_eq!(claimed.id, nightly.id);
}

#[tokio::test]
async fn test_blocked_task_does_not_hide_later_ones() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let blocked = store.enqueue(NewTask::new("nightly", windowed(22, 2))).await.unwrap();
    let open = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    let claimed = store.claim_next(50, at_hour(9)).await.unwrap().unwrap();
    assert_eq!(claimed.id, open.id);
    assert_eq!(
        store.get(blocked.id).await.unwrap().unwrap().status,
        TaskStatus::Queued
    );
}

#[tokio::test]
async fn test_override_and_malformed_schedules_are_claimable() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let overridden = ScheduleDescriptor::window(22, 2).overridden_at(chrono::Utc::now());
    store
        .enqueue(NewTask::new("manual", json!({ "schedule": overridden })))
        .await
        .unwrap();
    store
        .enqueue(NewTask::new("odd", json!({"schedule": "whenever"})))
        .await
        .unwrap();

    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_some());
    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_scan_limit_bounds_candidates() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    for _ in 0..3 {
        store.enqueue(NewTask::new("nightly", windowed(22, 2))).await.unwrap();
    }
    let open = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    assert!(store.claim_next(3, at_hour(12)).await.unwrap().is_none());
    let claimed = store.claim_next(4, at_hour(12)).await.unwrap().unwrap();
    assert_eq!(claimed.id, open.id);
}

#[tokio::test]
async fn test_archived_tasks_are_never_claimed() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let task = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();
    assert!(store.set_archived(task.id, true).await.unwrap());
    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_none());

    assert!(store.set_archived(task.id, false).await.unwrap());
    assert!(store.claim_next(50, at_hour(12)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreadable_payload_is_skipped() {
    let fixture = SqliteFixture::new().await;
    let store = &fixture.store;

    let corrupt_id = TaskId::new_v4();
    let key = corrupt_id.to_string();
    let conn = store.database().get_connection().await.unwrap();
    conn.interact(move |conn| {
        diesel::sql_query(
            "INSERT INTO tasks (id, group_id, event_type, status, archived, payload, retries, \
             result, created_at, updated_at) VALUES (?, NULL, 'broken', 'queued', 0, '{not json', \
             0, '{}', '2000-01-01T00:00:00.000000Z', '2000-01-01T00:00:00.000000Z')",
        )
        .bind::<diesel::sql_types::Text, _>(key)
        .execute(conn)
    })
    .await
    .unwrap()
    .unwrap();
    drop(conn);

    let good = store.enqueue(NewTask::new("push", json!({}))).await.unwrap();

    let claimed = store.claim_next(50, at_hour(12)).await.unwrap().unwrap();
    assert_eq!(claimed.id, good.id);
    assert!(matches!(
        store.get(corrupt_id).await,
        Err(StoreError::CorruptRecord { .. })
    ));
}

/// Many workers sharing one store race for a batch of tasks; every task must
/// be claimed exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_shared_pool_no_duplicates() {
    let fixture = SqliteFixture::new().await;
    const NUM_TASKS: usize = 20;
    const NUM_WORKERS: usize = 8;

    let mut created = HashSet::new();
    for i in 0..NUM_TASKS {
        let task = fixture
            .store
            .enqueue(NewTask::new("push", json!({ "n": i })))
            .await
            .unwrap();
        created.insert(task.id);
    }

    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();
    for _ in 0..NUM_WORKERS {
        let store = fixture.store.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut claimed = Vec::new();
            while let Some(task) = store.claim_next(5, at_hour(12)).await.unwrap() {
                claimed.push(task.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "Task {} was claimed twice", id);
        }
    }
    assert_eq!(seen, created);
}

/// Independent connection pools on one database file behave like separate
/// runner processes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_separate_connections_no_duplicates() {
    let fixture = SqliteFixture::new().await;
    const NUM_TASKS: usize = 12;
    const NUM_WORKERS: usize = 3;

    for i in 0..NUM_TASKS {
        fixture
            .store
            .enqueue(NewTask::new("push", json!({ "n": i })))
            .await
            .unwrap();
    }

    let mut stores = vec![fixture.store.clone()];
    for _ in 1..NUM_WORKERS {
        stores.push(fixture.open_another().await);
    }

    let barrier = Arc::new(Barrier::new(NUM_WORKERS));
    let mut handles = Vec::new();
    for store in stores {
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut claimed = Vec::new();
            while let Some(task) = store.claim_next(NUM_TASKS, at_hour(12)).await.unwrap() {
                claimed.push(task.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "Task {} was claimed twice", id);
        }
    }
    assert_eq!(seen.len(), NUM_TASKS);
}
