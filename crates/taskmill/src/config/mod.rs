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

//! Engine configuration files.
//!
//! An [`EngineConfig`] is read from TOML by the [`ConfigLoader`]. Every key is
//! optional; missing keys fall back to the same defaults as
//! [`RunnerConfig::default()`].
//!
//! ```toml
//! [database]
//! url = "${TASKMILL_DATABASE_URL:-sqlite://taskmill.db}"
//!
//! [runner]
//! scan_limit = 50
//! control_poll_interval_ms = 2000
//! trigger_interval_secs = 10
//! name = "runner-a"
//! ```

mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dal::DEFAULT_SCAN_LIMIT;
use crate::error::ConfigValidationError;
use crate::runner::RunnerConfig;

pub use loader::ConfigLoader;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "TASKMILL_CONFIG";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://taskmill.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub runner: RunnerSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// The `[runner]` table. Durations are plain integers in the unit named by
/// the key suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub scan_limit: usize,
    pub control_poll_interval_ms: u64,
    pub finalize_base_delay_ms: u64,
    pub finalize_max_delay_ms: u64,
    pub finalize_log_interval_secs: u64,
    pub log_window: usize,
    /// Period of the fallback trigger used by long-running processes.
    pub trigger_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
            control_poll_interval_ms: 2_000,
            finalize_base_delay_ms: 500,
            finalize_max_delay_ms: 30_000,
            finalize_log_interval_secs: 30,
            log_window: 500,
            trigger_interval_secs: 10,
            name: None,
        }
    }
}

impl RunnerSection {
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs)
    }
}

impl EngineConfig {
    /// Builds the runner configuration described by the `[runner]` table.
    pub fn to_runner_config(&self) -> RunnerConfig {
        let runner = &self.runner;
        RunnerConfig::builder()
            .scan_limit(runner.scan_limit)
            .control_poll_interval(Duration::from_millis(runner.control_poll_interval_ms))
            .finalize_base_delay(Duration::from_millis(runner.finalize_base_delay_ms))
            .finalize_max_delay(Duration::from_millis(runner.finalize_max_delay_ms))
            .finalize_log_interval(Duration::from_secs(runner.finalize_log_interval_secs))
            .log_window(runner.log_window)
            .runner_name(runner.name.clone())
            .build()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigValidationError::EmptyDatabaseUrl);
        }
        if self.runner.trigger_interval_secs == 0 {
            return Err(ConfigValidationError::ZeroInterval {
                name: "trigger_interval_secs",
            });
        }
        self.to_runner_config().validate()
    }
}
