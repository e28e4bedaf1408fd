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

//! Durable result finalization.
//!
//! A terminal result is never dropped because of a transient persistence
//! failure: the write is retried with exponential backoff, without an attempt
//! limit, until it succeeds or the task turns out to be gone. Failure logging
//! is throttled so a long outage does not flood the log.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dal::TaskStore;
use crate::error::StoreError;
use crate::models::{ResultPatch, TaskId, TaskStatus};

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Number of failures that are always logged before throttling starts.
const UNTHROTTLED_FAILURES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizerConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Minimum spacing between failure log lines once throttled.
    pub log_interval: Duration,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            log_interval: Duration::from_secs(30),
        }
    }
}

impl FinalizerConfig {
    /// Delay before the retry that follows failure number `failure`
    /// (zero-based): `min(max_delay, base_delay * 2^min(failure, 6))`.
    pub fn backoff_delay(&self, failure: u32) -> Duration {
        let factor = 1u32 << failure.min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// How a finalization ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The patch and status were persisted.
    Applied { attempts: u32 },
    /// The task was deleted before the write landed.
    TaskGone { attempts: u32 },
    /// The store refused the request itself (a non-terminal status).
    Rejected { attempts: u32 },
}

impl FinalizeOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            FinalizeOutcome::Applied { attempts }
            | FinalizeOutcome::TaskGone { attempts }
            | FinalizeOutcome::Rejected { attempts } => *attempts,
        }
    }
}

pub struct ResultFinalizer {
    store: Arc<dyn TaskStore>,
    config: FinalizerConfig,
}

impl ResultFinalizer {
    pub fn new(store: Arc<dyn TaskStore>, config: FinalizerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &FinalizerConfig {
        &self.config
    }

    /// Persists `patch` with terminal `status`, retrying until done.
    pub async fn finalize(
        &self,
        task_id: TaskId,
        patch: &ResultPatch,
        status: TaskStatus,
    ) -> FinalizeOutcome {
        let mut attempts: u32 = 0;
        let mut last_logged: Option<Instant> = None;
        let mut suppressed: u32 = 0;

        loop {
            attempts += 1;
            let err = match self.store.finalize(task_id, patch, status).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!(
                            task_id = %task_id,
                            status = %status,
                            attempts,
                            "Task result persisted after retries"
                        );
                    }
                    return FinalizeOutcome::Applied { attempts };
                }
                Err(e) if e.is_not_found() => {
                    debug!(task_id = %task_id, "Task removed before its result was persisted");
                    return FinalizeOutcome::TaskGone { attempts };
                }
                Err(StoreError::InvalidStatus(s)) => {
                    error!(task_id = %task_id, status = %s, "Refusing to finalize with non-terminal status");
                    return FinalizeOutcome::Rejected { attempts };
                }
                Err(e) => e,
            };

            let delay = self.config.backoff_delay(attempts - 1);
            let throttled = attempts > UNTHROTTLED_FAILURES
                && last_logged.is_some_and(|at| at.elapsed() < self.config.log_interval);
            if throttled {
                suppressed += 1;
            } else {
                warn!(
                    task_id = %task_id,
                    status = %status,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    suppressed,
                    error = %err,
                    "Failed to persist task result, retrying"
                );
                last_logged = Some(Instant::now());
                suppressed = 0;
            }

            tokio::time::sleep(delay).await;
        }
    }
}
