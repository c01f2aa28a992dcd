//! When the bot is allowed to look at the target post and act on it.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, Timelike, Utc};
use reciprocity_core::{ConfigError, CoreError};
use tracing::{debug, info};

/// Local hours `[start, end)` in which likes and replies may be sent.
pub const OPERATING_HOURS: (u32, u32) = (11, 20);

/// Daily check times as `(hour, minute)`, sorted.
pub const CHECK_TIMES: [(u32, u32); 4] = [(12, 0), (14, 0), (17, 0), (19, 0)];

/// Minimum spacing between two checks.
pub const CHECK_DEBOUNCE_SECS: i64 = 3600;

pub type LocalTime = DateTime<FixedOffset>;

pub trait Clock {
    fn now(&self) -> LocalTime;
}

/// Wall clock at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_hours: i32) -> Result<Self, CoreError> {
        Ok(Self {
            offset: local_offset(utc_offset_hours)?,
        })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> LocalTime {
        Utc::now().with_timezone(&self.offset)
    }
}

pub fn local_offset(utc_offset_hours: i32) -> Result<FixedOffset, CoreError> {
    FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
        ConfigError::InvalidValue {
            field: "utc_offset_hours".to_string(),
            value: utc_offset_hours.to_string(),
        }
        .into()
    })
}

pub fn is_operating_window(now: &LocalTime) -> bool {
    (OPERATING_HOURS.0..OPERATING_HOURS.1).contains(&now.hour())
}

fn is_check_minute(now: &LocalTime) -> bool {
    CHECK_TIMES.contains(&(now.hour(), now.minute()))
}

fn at_local(now: &LocalTime, date: NaiveDate, (hour, minute): (u32, u32)) -> Option<LocalTime> {
    date.and_hms_opt(hour, minute, 0)?
        .and_local_timezone(now.timezone())
        .single()
}

/// Earliest check time strictly after `now`, or the first one tomorrow.
pub fn next_scheduled_time(now: &LocalTime) -> LocalTime {
    let today = now.date_naive();
    let later_today = CHECK_TIMES
        .iter()
        .filter_map(|&time| at_local(now, today, time))
        .find(|candidate| candidate > now);

    later_today
        .or_else(|| {
            let tomorrow = today.succ_opt()?;
            at_local(now, tomorrow, CHECK_TIMES[0])
        })
        .unwrap_or_else(|| *now + ChronoDuration::hours(1))
}

/// Debounce state for the daily check list.
#[derive(Debug, Default, Clone)]
pub struct ScheduleGate {
    last_check: Option<LocalTime>,
    last_checked_date: Option<NaiveDate>,
}

impl ScheduleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_check(&self) -> Option<LocalTime> {
        self.last_check
    }

    /// True when `now` is on the check list and the previous check is at least an hour
    /// old. Firing records `now` as the last check.
    pub fn is_scheduled_check_time(&mut self, now: &LocalTime) -> bool {
        if !is_check_minute(now) {
            return false;
        }

        let debounced = self.last_check.is_some_and(|last| {
            now.signed_duration_since(last) < ChronoDuration::seconds(CHECK_DEBOUNCE_SECS)
        });
        if debounced {
            debug!("Check at {} skipped, last check was under an hour ago", now.format("%H:%M"));
            return false;
        }

        self.last_check = Some(*now);
        true
    }

    /// Records the calendar date of a check. Returns true on the first check of a new day.
    pub fn note_day(&mut self, now: &LocalTime) -> bool {
        let today = now.date_naive();
        if self.last_checked_date == Some(today) {
            return false;
        }
        if self.last_checked_date.is_some() {
            info!("New day {}, starting a fresh round of checks", today);
        }
        self.last_checked_date = Some(today);
        true
    }
}
