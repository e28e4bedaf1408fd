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

//! Mutable task result and the partial updates applied to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logs::LogSnapshot;

/// The mutable result attached to every task.
///
/// `logs` holds only the retained rolling window while `seq` counts every
/// line ever appended, so `seq >= logs.len()` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskResult {
    pub logs: Vec<String>,
    pub seq: u64,
    pub output: String,
    pub provider_ref: Option<String>,
    pub message: Option<String>,
    /// Pass-through fields reported by the execution collaborator.
    pub extra: Map<String, Value>,
}

impl TaskResult {
    pub fn log_snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            lines: self.logs.clone(),
            seq: self.seq,
        }
    }

    /// Applies a patch in place.
    pub fn apply(&mut self, patch: &ResultPatch) {
        if let Some(logs) = &patch.logs {
            self.logs = logs.clone();
        }
        if let Some(seq) = patch.seq {
            self.seq = seq;
        }
        if let Some(output) = &patch.output {
            self.output = output.clone();
        }
        if let Some(provider_ref) = &patch.provider_ref {
            self.provider_ref = Some(provider_ref.clone());
        }
        if let Some(message) = &patch.message {
            self.message = message.clone();
        }
        for (key, value) in &patch.extra {
            if value.is_null() {
                self.extra.remove(key);
            } else {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }

    /// Applies a terminal patch. `seq` never moves backwards here, since
    /// lines streamed during the run were already counted.
    pub fn apply_final(&mut self, patch: &ResultPatch) {
        let stored = self.seq;
        self.apply(patch);
        self.seq = self.seq.max(stored).max(self.logs.len() as u64);
    }
}

/// A partial update of a [`TaskResult`].
///
/// `None` fields leave the stored value untouched. `message` distinguishes
/// "leave alone" (`None`), "clear" (`Some(None)`) and "set" (`Some(Some(_))`).
/// `extra` keys are merged; a `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultPatch {
    pub logs: Option<Vec<String>>,
    pub seq: Option<u64>,
    pub output: Option<String>,
    pub provider_ref: Option<String>,
    pub message: Option<Option<String>>,
    pub extra: Map<String, Value>,
}

impl ResultPatch {
    /// Clears the fields scoped to a single run before a task executes again.
    pub fn run_reset() -> Self {
        Self {
            logs: Some(Vec::new()),
            seq: Some(0),
            output: Some(String::new()),
            message: Some(None),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(Some(message.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_none()
            && self.seq.is_none()
            && self.output.is_none()
            && self.provider_ref.is_none()
            && self.message.is_none()
            && self.extra.is_empty()
    }
}
