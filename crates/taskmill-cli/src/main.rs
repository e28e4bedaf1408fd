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

//! taskmill CLI - operator commands over a taskmill task store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskmill::{ConfigLoader, EngineConfig, SqliteTaskStore};
use tracing::{debug, Level};

mod commands;
mod shell;

/// taskmill - a serial, schedule-aware task queue
#[derive(Parser)]
#[command(name = "taskmill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (overrides the configuration file)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Configuration file (defaults to TASKMILL_CONFIG or the search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a new task
    Enqueue {
        /// Event type recorded on the task
        event_type: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Group the task belongs to
        #[arg(long)]
        group: Option<String>,

        /// Hour window in server-local time, e.g. "22-2"
        #[arg(long)]
        window: Option<String>,

        /// Schedule source tag (robot, trigger, chat)
        #[arg(long, requires = "window")]
        source: Option<String>,
    },
    /// Print a task and its result
    Show { id: String },
    /// List tasks, oldest first
    List {
        #[arg(long)]
        status: Option<String>,

        /// Only archived tasks
        #[arg(long, conflicts_with = "all")]
        archived: bool,

        /// Archived and non-archived tasks
        #[arg(long)]
        all: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Ask a queued or running task to pause
    Pause { id: String },
    /// Re-queue a failed or paused task
    Retry { id: String },
    /// Archive a task, or restore it with --unarchive
    Archive {
        id: String,

        #[arg(long)]
        unarchive: bool,
    },
    /// Delete a task
    Delete { id: String },
    /// Print task log lines after a given sequence number
    Logs {
        id: String,

        /// Last sequence number already seen
        #[arg(long, default_value_t = 0)]
        since: u64,

        /// Keep polling until the task reaches a terminal status
        #[arg(short, long)]
        follow: bool,
    },
    /// Run queued tasks with the shell executor
    Run {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    taskmill::init_logging(cli.verbose.then_some(Level::DEBUG));

    let config = resolve_config(&cli)?;
    debug!(database_url = %config.database.url, "Opening task store");
    let store = SqliteTaskStore::connect(&config.database.url)
        .await
        .with_context(|| format!("Failed to open task store at {}", config.database.url))?;

    match cli.command {
        Commands::Enqueue {
            event_type,
            payload,
            group,
            window,
            source,
        } => {
            commands::enqueue::run(
                &store,
                &event_type,
                &payload,
                group,
                window.as_deref(),
                source.as_deref(),
            )
            .await?
        }
        Commands::Show { id } => commands::tasks::show(&store, &id).await?,
        Commands::List {
            status,
            archived,
            all,
            limit,
        } => commands::tasks::list(&store, status.as_deref(), archived, all, limit).await?,
        Commands::Pause { id } => commands::tasks::pause(&store, &id).await?,
        Commands::Retry { id } => commands::tasks::retry(&store, &id).await?,
        Commands::Archive { id, unarchive } => {
            commands::tasks::archive(&store, &id, !unarchive).await?
        }
        Commands::Delete { id } => commands::tasks::delete(&store, &id).await?,
        Commands::Logs { id, since, follow } => {
            commands::logs::run(&store, &id, since, follow).await?
        }
        Commands::Run { once } => commands::run::run(store, &config, once).await?,
    }

    Ok(())
}

/// Loads the configuration file, if any, and applies `--database-url`.
fn resolve_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = ConfigLoader::new()
        .load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
