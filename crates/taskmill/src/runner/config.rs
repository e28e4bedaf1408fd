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

//! Configuration types for the [`TaskRunner`](super::TaskRunner).

use std::time::Duration;

use crate::dal::DEFAULT_SCAN_LIMIT;
use crate::error::ConfigValidationError;
use crate::executor::FinalizerConfig;

/// Configuration for the task runner.
///
/// Use [`RunnerConfig::builder()`] to create a configuration:
///
/// ```rust
/// use std::time::Duration;
/// use taskmill::runner::RunnerConfig;
///
/// let config = RunnerConfig::builder()
///     .scan_limit(20)
///     .control_poll_interval(Duration::from_millis(500))
///     .build();
/// assert_eq!(config.scan_limit(), 20);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunnerConfig {
    scan_limit: usize,
    control_poll_interval: Duration,
    finalize_base_delay: Duration,
    finalize_max_delay: Duration,
    finalize_log_interval: Duration,
    log_window: usize,
    runner_name: Option<String>,
}

impl RunnerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Candidates inspected per claim attempt.
    pub fn scan_limit(&self) -> usize {
        self.scan_limit
    }

    /// How often a running task's control state is re-read.
    pub fn control_poll_interval(&self) -> Duration {
        self.control_poll_interval
    }

    pub fn finalize_base_delay(&self) -> Duration {
        self.finalize_base_delay
    }

    pub fn finalize_max_delay(&self) -> Duration {
        self.finalize_max_delay
    }

    pub fn finalize_log_interval(&self) -> Duration {
        self.finalize_log_interval
    }

    /// Maximum number of log lines retained per task.
    pub fn log_window(&self) -> usize {
        self.log_window
    }

    /// Name used in log output to tell runners apart.
    pub fn runner_name(&self) -> Option<&str> {
        self.runner_name.as_deref()
    }

    pub fn finalizer(&self) -> FinalizerConfig {
        FinalizerConfig {
            base_delay: self.finalize_base_delay,
            max_delay: self.finalize_max_delay,
            log_interval: self.finalize_log_interval,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.scan_limit == 0 {
            return Err(ConfigValidationError::ZeroScanLimit);
        }
        if self.log_window == 0 {
            return Err(ConfigValidationError::ZeroLogWindow);
        }
        for (name, value) in [
            ("control_poll_interval", self.control_poll_interval),
            ("finalize_base_delay", self.finalize_base_delay),
            ("finalize_max_delay", self.finalize_max_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigValidationError::ZeroInterval { name });
            }
        }
        Ok(())
    }
}

/// Builder for [`RunnerConfig`].
#[derive(Debug, Clone)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl Default for RunnerConfigBuilder {
    fn default() -> Self {
        let finalizer = FinalizerConfig::default();
        Self {
            config: RunnerConfig {
                scan_limit: DEFAULT_SCAN_LIMIT,
                control_poll_interval: Duration::from_secs(2),
                finalize_base_delay: finalizer.base_delay,
                finalize_max_delay: finalizer.max_delay,
                finalize_log_interval: finalizer.log_interval,
                log_window: 500,
                runner_name: None,
            },
        }
    }
}

impl RunnerConfigBuilder {
    pub fn scan_limit(mut self, value: usize) -> Self {
        self.config.scan_limit = value;
        self
    }

    pub fn control_poll_interval(mut self, value: Duration) -> Self {
        self.config.control_poll_interval = value;
        self
    }

    pub fn finalize_base_delay(mut self, value: Duration) -> Self {
        self.config.finalize_base_delay = value;
        self
    }

    pub fn finalize_max_delay(mut self, value: Duration) -> Self {
        self.config.finalize_max_delay = value;
        self
    }

    pub fn finalize_log_interval(mut self, value: Duration) -> Self {
        self.config.finalize_log_interval = value;
        self
    }

    pub fn log_window(mut self, value: usize) -> Self {
        self.config.log_window = value;
        self
    }

    pub fn runner_name(mut self, value: Option<String>) -> Self {
        self.config.runner_name = value;
        self
    }

    pub fn build(self) -> RunnerConfig {
        self.config
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfigBuilder::default().build()
    }
}
