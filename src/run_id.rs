//! Run identity: `YYYYMMDD_HHMMSS_XXXX`.
//!
//! The date/time segment is local wall-clock time at generation. `XXXX` is a
//! lowercase hex counter scoped to that second. The first id of a second starts
//! the counter at a random offset below `0x1000`, so two processes launched in
//! the same second rarely meet, while ids from one process keep increasing.

use crate::error::{CaptureError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_SUFFIX: u32 = 0xFFFF;
const RANDOM_START_BOUND: u32 = 0x1000;

/// One execution's unique handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Generate a fresh identity from the process-wide generator.
    pub fn generate() -> Result<Self> {
        generator().next()
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn generator() -> &'static RunIdGenerator {
    static CELL: OnceLock<RunIdGenerator> = OnceLock::new();
    CELL.get_or_init(RunIdGenerator::new)
}

#[derive(Debug, Clone, Copy)]
struct SecondState {
    second: NaiveDateTime,
    next_suffix: u32,
}

/// Produces pairwise-distinct, lexically non-decreasing run ids.
pub struct RunIdGenerator {
    state: Mutex<Option<SecondState>>,
}

impl Default for RunIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Next id using the system clock.
    pub fn next(&self) -> Result<RunIdentity> {
        loop {
            let now = system_now()?;
            if let Some(identity) = self.next_at(now) {
                return Ok(identity);
            }
            // Counter space for this second is spent; wait for the clock to move.
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Next id for a given instant, or `None` when every suffix of that
    /// second is already taken.
    pub fn next_at(&self, now: DateTime<Utc>) -> Option<RunIdentity> {
        let local_second = truncate_to_second(now.with_timezone(&Local).naive_local());
        let mut guard = self.state.lock();

        let state = match *guard {
            // A clock that steps backwards keeps issuing under the latest second
            // so ordering never regresses.
            Some(state) if local_second <= state.second => state,
            _ => SecondState {
                second: local_second,
                next_suffix: rand::rng().random_range(0..RANDOM_START_BOUND),
            },
        };

        if state.next_suffix > MAX_SUFFIX {
            *guard = Some(state);
            return None;
        }

        let id = format!(
            "{}_{:04x}",
            state.second.format(STAMP_FORMAT),
            state.next_suffix
        );
        *guard = Some(SecondState {
            second: state.second,
            next_suffix: state.next_suffix + 1,
        });

        Some(RunIdentity {
            id,
            created_at: now,
        })
    }
}

fn system_now() -> Result<DateTime<Utc>> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| CaptureError::ClockUnavailable)?;
    Utc.timestamp_opt(
        since_epoch.as_secs() as i64,
        since_epoch.subsec_nanos(),
    )
    .single()
    .ok_or(CaptureError::ClockUnavailable)
}

fn truncate_to_second(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Checks the `YYYYMMDD_HHMMSS_XXXX` shape.
pub fn is_valid_run_id(id: &str) -> bool {
    let parts: Vec<&str> = id.split('_').collect();
    if parts.len() != 3 {
        return false;
    }
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    digits(parts[0], 8)
        && digits(parts[1], 6)
        && parts[2].len() == 4
        && parts[2]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        && NaiveDateTime::parse_from_str(&format!("{}_{}", parts[0], parts[1]), STAMP_FORMAT)
            .is_ok()
}
