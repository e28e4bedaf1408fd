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

//! # taskmill
//!
//! A serial, schedule-aware task queue engine. Tasks are persisted units of
//! work; a [`TaskRunner`] claims them one at a time from a [`TaskStore`],
//! hands them to a [`TaskExecutor`], watches for external pause or delete
//! requests while they run, and persists the outcome with unbounded retry.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::json;
//! use taskmill::executor::{ExecutionFailure, ExecutionOutput, TaskExecutor};
//! use taskmill::{NewTask, RunnerConfig, SqliteTaskStore, Task, TaskRunner, TaskStore};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl TaskExecutor for Echo {
//!     async fn execute(
//!         &self,
//!         task: &Task,
//!         _cancel: CancellationToken,
//!     ) -> Result<ExecutionOutput, ExecutionFailure> {
//!         Ok(ExecutionOutput::with_logs(vec![task.event_type.clone()]))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteTaskStore::connect("sqlite://taskmill.db").await?);
//! store.enqueue(NewTask::new("push", json!({"repo": "acme/api"}))).await?;
//!
//! let runner = TaskRunner::new(store, Arc::new(Echo), RunnerConfig::default());
//! runner.trigger().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`schedule`]: hour-window evaluation for schedule descriptors.
//! - [`dal`]: the [`TaskStore`] trait, SQLite and in-memory backends.
//! - [`executor`]: the execution seam, control-state watcher and result finalizer.
//! - [`runner`]: the coalescing drain loop.
//! - [`logs`]: rolling-window logs and incremental delta reconciliation.
//! - [`config`]: TOML configuration loading.

pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod executor;
pub mod logs;
pub mod models;
pub mod runner;
pub mod schedule;

pub use config::{ConfigLoader, EngineConfig};
pub use dal::{InMemoryTaskStore, SqliteTaskStore, TaskStore};
pub use database::Database;
pub use error::{ConfigError, ConfigValidationError, StoreError};
pub use executor::{ExecutionFailure, ExecutionOutput, TaskExecutor};
pub use logs::{reconcile, LogDelta, LogSnapshot};
pub use models::{ControlState, NewTask, ResultPatch, Task, TaskFilter, TaskId, TaskResult, TaskStatus};
pub use runner::{RunnerConfig, TaskHooks, TaskRunner, TriggerOutcome};
pub use schedule::ScheduleDescriptor;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global `tracing` subscriber writing to stderr.
///
/// With `Some(level)` that level is used for everything; otherwise `RUST_LOG`
/// is honored and falls back to `info`. Calling it again is a no-op.
pub fn init_logging(level: Option<Level>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str().to_lowercase()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
