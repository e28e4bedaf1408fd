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

//! Error types for the taskmill engine.
//!
//! Only persistence and configuration problems are modelled as errors here.
//! Schedule-blocked candidates and lost claim races are ordinary control flow
//! inside the store and never surface as `Err`.

use thiserror::Error;

use crate::models::task::TaskId;

/// Errors raised by a [`TaskStore`](crate::dal::TaskStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The task record no longer exists (deleted externally).
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// A pooled connection could not be obtained or the blocking
    /// interaction was aborted.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be mapped back to a domain value.
    #[error("Corrupt task record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Invalid task status: '{0}'")]
    InvalidStatus(String),

    /// Only raised by the in-memory store.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns true when the error means the record is gone rather than
    /// that the write failed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::TaskNotFound(_))
    }
}

/// Errors raised while loading or validating an engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in any search location")]
    ConfigNotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Environment variable substitution failed: {0}")]
    EnvSubstitutionError(String),

    #[error("Unsupported configuration file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ConfigValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("Database URL must not be empty")]
    EmptyDatabaseUrl,

    #[error("Scan limit must be greater than zero")]
    ZeroScanLimit,

    #[error("Log window must be greater than zero")]
    ZeroLogWindow,

    #[error("Interval '{name}' must be greater than zero")]
    ZeroInterval { name: &'static str },
}
