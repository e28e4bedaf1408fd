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

//! Implementation of the `run` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use taskmill::{EngineConfig, SqliteTaskStore, TaskRunner, TaskStore, TriggerOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::shell::ShellExecutor;

pub async fn run(store: SqliteTaskStore, config: &EngineConfig, once: bool) -> Result<()> {
    let runner_config = config.to_runner_config();
    runner_config
        .validate()
        .context("Invalid runner configuration")?;

    let store: Arc<dyn TaskStore> = Arc::new(store);
    let executor = Arc::new(ShellExecutor::new(
        Arc::clone(&store),
        runner_config.log_window(),
    ));
    let runner = TaskRunner::new(store, executor, runner_config);

    if once {
        if let TriggerOutcome::Drained { passes } = runner.trigger().await {
            let stats = runner.stats();
            info!(passes, tasks = stats.tasks_processed, "Queue drained");
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current drain");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    runner
        .run_periodic(config.runner.trigger_interval(), shutdown)
        .await;
    Ok(())
}
