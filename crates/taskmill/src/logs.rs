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

//! # Rolling-Window Logs
//!
//! Task logs are persisted as a rolling window: only the most recent lines are
//! retained while `seq` counts every line ever appended. Line number `n`
//! (1-based) is therefore retained iff `seq - len + 1 <= n <= seq`.
//!
//! Consumers that stream logs remember the last `seq` they rendered and call
//! [`reconcile`] against each fresh [`LogSnapshot`] to learn whether to append
//! new lines, replace their view, or do nothing.
//!
//! ```rust
//! use taskmill::logs::{reconcile, LogDelta, LogSnapshot};
//!
//! let snapshot = LogSnapshot::new(vec!["b".into(), "c".into()], 3);
//! assert_eq!(
//!     reconcile(2, &snapshot),
//!     LogDelta::Append { lines: vec!["c".into()], next_seen_seq: 3 }
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Persisted log state: retained lines plus the total line counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSnapshot {
    pub lines: Vec<String>,
    pub seq: u64,
}

impl LogSnapshot {
    pub fn new(lines: Vec<String>, seq: u64) -> Self {
        Self { lines, seq }
    }

    /// `seq` must never be smaller than the number of retained lines.
    pub fn is_consistent(&self) -> bool {
        self.seq >= self.lines.len() as u64
    }

    /// An explicit reset back to an empty log.
    pub fn is_reset(&self) -> bool {
        self.seq == 0 && self.lines.is_empty()
    }

    /// 1-based number of the oldest retained line.
    pub fn oldest_seq(&self) -> u64 {
        (self.seq + 1).saturating_sub(self.lines.len() as u64)
    }

    /// Appends lines and evicts from the front so at most `window` remain.
    /// A window of zero is treated as one, as in [`RollingLog::new`].
    pub fn push_lines<I>(&mut self, lines: I, window: usize)
    where
        I: IntoIterator<Item = String>,
    {
        let window = window.max(1);
        for line in lines {
            self.lines.push(line);
            self.seq += 1;
        }
        if self.lines.len() > window {
            let excess = self.lines.len() - window;
            self.lines.drain(..excess);
        }
    }
}

/// What a consumer must do to bring its view up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDelta {
    /// The view is current (or the store lags behind it).
    Noop,
    /// Append these lines to the existing view.
    Append {
        lines: Vec<String>,
        next_seen_seq: u64,
    },
    /// Discard the view and replace it with these lines.
    Resync {
        lines: Vec<String>,
        next_seen_seq: u64,
    },
}

/// Computes the minimal update a consumer needs, given the last `seq` it
/// rendered. Stateless and total: every input yields a delta.
pub fn reconcile(seen_seq: u64, snapshot: &LogSnapshot) -> LogDelta {
    if !snapshot.is_consistent() {
        return LogDelta::Resync {
            lines: snapshot.lines.clone(),
            next_seen_seq: snapshot.seq,
        };
    }

    if snapshot.seq == seen_seq {
        return LogDelta::Noop;
    }

    if snapshot.seq < seen_seq {
        // A full reset is the only legitimate way for seq to go backwards.
        if snapshot.is_reset() {
            return LogDelta::Resync {
                lines: Vec::new(),
                next_seen_seq: 0,
            };
        }
        return LogDelta::Noop;
    }

    if snapshot.lines.is_empty() {
        return LogDelta::Resync {
            lines: Vec::new(),
            next_seen_seq: snapshot.seq,
        };
    }

    let oldest = snapshot.oldest_seq();
    let first_needed = seen_seq + 1;
    if first_needed < oldest {
        return LogDelta::Resync {
            lines: snapshot.lines.clone(),
            next_seen_seq: snapshot.seq,
        };
    }

    let offset = (first_needed - oldest) as usize;
    LogDelta::Append {
        lines: snapshot.lines[offset..].to_vec(),
        next_seen_seq: snapshot.seq,
    }
}

/// Producer-side bounded buffer that keeps counting past evictions.
#[derive(Debug, Clone)]
pub struct RollingLog {
    lines: VecDeque<String>,
    seq: u64,
    window: usize,
}

impl RollingLog {
    pub fn new(window: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(window.min(1024)),
            seq: 0,
            window: window.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        self.seq += 1;
        while self.lines.len() > self.window {
            self.lines.pop_front();
        }
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            lines: self.lines.iter().cloned().collect(),
            seq: self.seq,
        }
    }

    /// Consumes the buffer, returning the retained lines and the counter.
    pub fn into_parts(self) -> (Vec<String>, u64) {
        (self.lines.into_iter().collect(), self.seq)
    }
}

/// Consumer-side view that follows a stream of snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogView {
    lines: Vec<String>,
    seen_seq: u64,
}

impl LogView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn seen_seq(&self) -> u64 {
        self.seen_seq
    }

    /// Reconciles against a snapshot and applies the resulting delta.
    pub fn update(&mut self, snapshot: &LogSnapshot) -> LogDelta {
        let delta = reconcile(self.seen_seq, snapshot);
        self.apply(&delta);
        delta
    }

    pub fn apply(&mut self, delta: &LogDelta) {
        match delta {
            LogDelta::Noop => {}
            LogDelta::Append {
                lines,
                next_seen_seq,
            } => {
                self.lines.extend(lines.iter().cloned());
                self.seen_seq = *next_seen_seq;
            }
            LogDelta::Resync {
                lines,
                next_seen_seq,
            } => {
                self.lines = lines.clone();
                self.seen_seq = *next_seen_seq;
            }
        }
    }
}
