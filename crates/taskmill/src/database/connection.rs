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

//! SQLite connection management.
//!
//! Provides an async connection pool built on `deadpool-diesel`. The pool is
//! always a single connection: SQLite has limited concurrent write support
//! even in WAL mode, and one connection avoids "database is locked" errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use taskmill::database::Database;
//!
//! # async fn example() -> Result<(), taskmill::StoreError> {
//! let db = Database::try_new("sqlite:///var/lib/taskmill/tasks.db")?;
//! db.run_migrations().await?;
//! # Ok(())
//! # }
//! ```

use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};
use tracing::{debug, info};

use crate::error::StoreError;

/// Pooled SQLite connection object.
pub type SqliteConnectionObject = deadpool::managed::Object<SqliteManager>;

/// Thread-safe handle to the SQLite connection pool.
///
/// `Database` is `Clone`; every clone shares the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    url: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Creates the connection pool for a file path, `sqlite://` URL or
    /// `:memory:`.
    pub fn try_new(connection_string: &str) -> Result<Self, StoreError> {
        let url = Self::build_sqlite_url(connection_string);
        let manager = SqliteManager::new(url.clone(), SqliteRuntime::Tokio1);
        let sqlite_pool_size = 1;
        let pool = SqlitePool::builder(manager)
            .max_size(sqlite_pool_size)
            .build()
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        info!(
            url = %url,
            "SQLite connection pool initialized (size: {})",
            sqlite_pool_size
        );

        Ok(Self { pool, url })
    }

    /// Creates the pool and brings the schema up to date.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let db = Self::try_new(connection_string)?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// The path or URL handed to SQLite.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn get_connection(&self) -> Result<SqliteConnectionObject, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))
    }

    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Sets the connection pragmas and runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        use diesel_migrations::MigrationHarness;

        let conn = self.get_connection().await?;
        conn.interact(|conn| -> Result<(), StoreError> {
            use diesel::prelude::*;

            // WAL allows concurrent readers during writes
            diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
            diesel::sql_query("PRAGMA busy_timeout=30000;").execute(conn)?;

            let applied = conn
                .run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                .map_err(|e| StoreError::Migration(e.to_string()))?;
            debug!(count = applied.len(), "Applied pending migrations");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }
}
