use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use uuid::Uuid;

/// Default ± slack within which "now" counts as the schedule's configured time.
pub const DEFAULT_TRIGGER_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("days_of_week must not be empty")]
    EmptyDays,
    #[error("day index {0} is outside 0 (Sunday) ..= 6 (Saturday)")]
    DayOutOfRange(i64),
    #[error("time of day '{0}' is not HH:MM")]
    InvalidTimeOfDay(String),
    #[error("unknown IANA timezone '{0}'")]
    UnknownTimezone(String),
}

/// Set of weekdays, indexed 0 = Sunday ..= 6 = Saturday.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet(u8);

impl DaySet {
    pub fn from_indices<I>(indices: I) -> Result<Self, ScheduleError>
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        let mut bits = 0u8;
        for raw in indices {
            let idx: i64 = raw.into();
            if !(0..=6).contains(&idx) {
                return Err(ScheduleError::DayOutOfRange(idx));
            }
            bits |= 1 << idx;
        }
        if bits == 0 {
            return Err(ScheduleError::EmptyDays);
        }
        Ok(Self(bits))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7).filter(|idx| self.0 & (1 << idx) != 0).collect()
    }
}

impl fmt::Debug for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}

/// Wall-clock time of day, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTimeOfDay(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    /// Seconds are dropped: schedules never fire at sub-minute offsets.
    pub fn from_naive(time: NaiveTime) -> Self {
        use chrono::Timelike;
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }

    pub fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    /// Accepts `HH:MM` and `HH:MM:SS` (the seconds are ignored).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTimeOfDay(raw.to_string());
        let mut parts = raw.trim().split(':');
        let hour = parts.next().and_then(|h| h.parse().ok()).ok_or_else(invalid)?;
        let minute = parts.next().and_then(|m| m.parse().ok()).ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            seconds.parse::<u32>().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz, ScheduleError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(raw.to_string()))
}

/// A user's recurring check-in intent. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub days: DaySet,
    pub time_of_day: TimeOfDay,
    pub timezone: Tz,
    pub active: bool,
}

/// Decides whether a schedule's trigger window contains a given instant.
///
/// This is a pollable predicate, not a cron evaluator: the caller is expected
/// to evaluate it at least once per tolerance window or a fire is missed.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleMatcher {
    tolerance: Duration,
}

impl Default for ScheduleMatcher {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TRIGGER_TOLERANCE_SECS))
    }
}

impl ScheduleMatcher {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn should_fire(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        if !schedule.active {
            return false;
        }
        let local_today = now.with_timezone(&schedule.timezone).date_naive();

        // Yesterday and tomorrow (local) are checked too, so a window that
        // straddles local midnight still matches from either side.
        [local_today.pred_opt(), Some(local_today), local_today.succ_opt()]
            .into_iter()
            .flatten()
            .filter(|date| schedule.days.contains(date.weekday()))
            .filter_map(|date| scheduled_instant(schedule, date))
            .any(|instant| abs_delta(instant, now) <= self.tolerance)
    }
}

/// The UTC instant of the schedule's wall-clock time on `date` in its zone.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant; local
/// times inside a DST gap are shifted forward by one hour.
pub fn scheduled_instant(schedule: &Schedule, date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_time(schedule.time_of_day.as_naive());
    let tz = schedule.timezone;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|local| local.with_timezone(&Utc))
}

fn abs_delta(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    let delta = a - b;
    if delta < Duration::zero() { -delta } else { delta }
}
