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

//! Database layer: SQLite connection pool, schema and embedded migrations.
//!
//! Timestamps are stored as fixed-width RFC3339 text (microsecond precision,
//! `Z` suffix) so that ordering by the text column orders by time.

pub mod connection;
pub mod schema;

pub use connection::Database;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use parking_lot::Mutex;

pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

static LAST_CREATED: Mutex<Option<DateTime<Utc>>> = parking_lot::const_mutex(None);

/// Formats a timestamp for storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to storage precision.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000))
}

/// Creation timestamp that is strictly increasing within this process, so
/// tasks enqueued back to back keep their submission order.
pub fn creation_timestamp() -> DateTime<Utc> {
    let mut last = LAST_CREATED.lock();
    let mut ts = now();
    if let Some(prev) = *last {
        if ts <= prev {
            ts = prev + Duration::microseconds(1);
        }
    }
    *last = Some(ts);
    ts
}
