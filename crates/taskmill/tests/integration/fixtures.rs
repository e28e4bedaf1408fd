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

//! Shared fixtures: a fresh SQLite database file per test.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeZone};
use taskmill::SqliteTaskStore;
use tempfile::TempDir;

pub struct SqliteFixture {
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
    path: PathBuf,
    pub store: Arc<SqliteTaskStore>,
}

impl SqliteFixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("taskmill.db");
        let store = SqliteTaskStore::connect(&database_url(&path))
            .await
            .expect("Failed to open SQLite store");

        Self {
            _dir: dir,
            path,
            store: Arc::new(store),
        }
    }

    /// Opens a second, independent connection pool on the same file, as
    /// another runner process would.
    pub async fn open_another(&self) -> Arc<SqliteTaskStore> {
        let store = SqliteTaskStore::connect(&database_url(&self.path))
            .await
            .expect("Failed to open second SQLite store");
        Arc::new(store)
    }
}

fn database_url(path: &std::path::Path) -> String {
    format!("sqlite://{}", path.display())
}

/// A fixed instant at the given hour, in UTC.
pub fn at_hour(hour: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 14, hour, 30, 0)
        .unwrap()
}
