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

//! # Schedule Evaluation
//!
//! A task may carry a schedule descriptor inside its payload (under the
//! `"schedule"` key) that restricts the hours of the day during which it may
//! be claimed. Hours are evaluated in server-local time.
//!
//! ```rust
//! use taskmill::schedule::{is_active, ScheduleDescriptor};
//!
//! // A window that wraps past midnight: 22:00 until 02:00.
//! let nightly = ScheduleDescriptor::window(22, 2);
//! assert!(is_active(Some(&nightly), 23));
//! assert!(is_active(Some(&nightly), 1));
//! assert!(!is_active(Some(&nightly), 12));
//!
//! // No descriptor means no restriction.
//! assert!(is_active(None, 12));
//! ```

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Payload key under which the descriptor is embedded.
pub const SCHEDULE_KEY: &str = "schedule";

/// Origin of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleSource {
    Robot,
    Trigger,
    Chat,
    #[serde(other)]
    Other,
}

/// Time-window gating metadata embedded in a task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ScheduleSource>,
    /// First hour (0-23) of the window, inclusive.
    pub start_hour: u32,
    /// Hour (0-23) at which the window closes, exclusive.
    pub end_hour: u32,
    /// Forces the task to run regardless of the window.
    #[serde(default, rename = "override")]
    pub override_window: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_rule_id: Option<String>,
}

impl ScheduleDescriptor {
    pub fn window(start_hour: u32, end_hour: u32) -> Self {
        Self {
            source: None,
            start_hour,
            end_hour,
            override_window: false,
            override_at: None,
            dedup_rule_id: None,
        }
    }

    pub fn with_source(mut self, source: ScheduleSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Marks the descriptor as overridden at the given instant.
    pub fn overridden_at(mut self, at: DateTime<Utc>) -> Self {
        self.override_window = true;
        self.override_at = Some(at);
        self
    }

    /// Extracts the descriptor embedded in a task payload.
    ///
    /// A malformed descriptor is reported and treated as absent so the task
    /// stays claimable instead of being stuck in the queue.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let raw = payload.get(SCHEDULE_KEY)?;
        if raw.is_null() {
            return None;
        }

        match serde_json::from_value::<ScheduleDescriptor>(raw.clone()) {
            Ok(desc) if desc.start_hour < 24 && desc.end_hour < 24 => Some(desc),
            Ok(desc) => {
                warn!(
                    start_hour = desc.start_hour,
                    end_hour = desc.end_hour,
                    "Ignoring schedule descriptor with out-of-range hours"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed schedule descriptor");
                None
            }
        }
    }
}

/// Decides whether a schedule permits execution at the given local hour.
pub fn is_active(descriptor: Option<&ScheduleDescriptor>, hour: u32) -> bool {
    let Some(desc) = descriptor else {
        return true;
    };
    if desc.override_window {
        return true;
    }

    let (start, end) = (desc.start_hour, desc.end_hour);
    if start == end {
        true
    } else if start < end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Same as [`is_active`], reading the hour from a timestamp in its own zone.
pub fn is_active_at<Tz: TimeZone>(
    descriptor: Option<&ScheduleDescriptor>,
    now: &DateTime<Tz>,
) -> bool {
    is_active(descriptor, now.hour())
}
