//! Wall-clock source, substitutable for deterministic tests.

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{AnimaError, Result};

/// Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Convert Unix seconds to a calendar time in the given UTC offset.
pub fn to_datetime(ts: i64, offset_minutes: i32) -> Result<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
        AnimaError::invalid_input(format!("UTC offset of {} minutes is invalid", offset_minutes))
    })?;
    let utc = DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| AnimaError::invalid_input(format!("timestamp {} is out of range", ts)))?;
    Ok(utc.with_timezone(&offset))
}

/// `[YYYY-MM-DD HH:MM:SS]` in the given UTC offset.
pub fn format_timestamp(ts: i64, offset_minutes: i32) -> Result<String> {
    Ok(to_datetime(ts, offset_minutes)?
        .format("[%Y-%m-%d %H:%M:%S]")
        .to_string())
}
