// =============================================================================
// Wall Clock: injectable time source for the session scheduler
// =============================================================================
//
// The trading session is defined in exchange-local wall-clock time. Hosts
// often run in UTC, so the clock either follows the host's local zone or a
// fixed UTC offset (e.g. +05:30 for IST) taken from configuration.
// =============================================================================

use std::fmt;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Zone
// =============================================================================

/// How UTC instants are mapped onto wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallZone {
    /// The host's local time zone.
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl WallZone {
    pub fn from_config(offset: Option<&str>) -> Result<Self> {
        match offset {
            Some(raw) => Ok(Self::Fixed(parse_utc_offset(raw)?)),
            None => Ok(Self::Local),
        }
    }

    /// Wall-clock time of `instant` in this zone.
    pub fn wall(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Local => instant.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

impl fmt::Display for WallZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Fixed(offset) => write!(f, "UTC{offset}"),
        }
    }
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM` or `Z` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => bail!("UTC offset '{raw}' must start with '+' or '-'"),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("UTC offset '{raw}' must look like +HH:MM");
    }
    let hours: i32 = digits[..2].parse().context("offset hours")?;
    let minutes: i32 = digits[2..].parse().context("offset minutes")?;
    if minutes >= 60 {
        bail!("UTC offset '{raw}' has invalid minutes");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset '{raw}' is out of range"))
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Zone used to turn instants into wall-clock time.
    fn zone(&self) -> WallZone;

    /// Current wall-clock time.
    fn now(&self) -> NaiveDateTime {
        self.zone().wall(self.now_utc())
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: WallZone,
}

impl SystemClock {
    pub fn new(zone: WallZone) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone(&self) -> WallZone {
        self.zone
    }
}

// =============================================================================
// ClockTime
// =============================================================================

/// Hour and minute of the day, compared at minute granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    /// Truncate a wall-clock time to its minute.
    pub fn of<T: Timelike>(t: &T) -> Self {
        Self::new(t.hour(), t.minute())
    }
}

impl std::str::FromStr for ClockTime {
    type Err = anyhow::Error;

    /// Accepts `HH:MM` or `HH:MM:SS` (seconds are ignored).
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split(':');
        let hour: u32 = parts
            .next()
            .context("missing hour")?
            .parse()
            .with_context(|| format!("invalid hour in '{s}'"))?;
        let minute: u32 = parts
            .next()
            .with_context(|| format!("missing minute in '{s}'"))?
            .parse()
            .with_context(|| format!("invalid minute in '{s}'"))?;
        if hour > 23 || minute > 59 {
            bail!("clock time '{s}' is out of range");
        }
        Ok(Self::new(hour, minute))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// =============================================================================
// Test clock
// =============================================================================

#[cfg(test)]
pub use fixed::{expiry_day, FixedClock};

#[cfg(test)]
mod fixed {
    use super::*;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    /// Manually driven clock whose wall time equals UTC.
    pub struct FixedClock {
        now: Mutex<NaiveDateTime>,
    }

    impl FixedClock {
        pub fn at(date: NaiveDate, hour: u32, minute: u32) -> Self {
            Self {
                now: Mutex::new(wall(date, hour, minute)),
            }
        }

        /// 2024-06-27 at `hour:minute`.
        pub fn on_expiry_day(hour: u32, minute: u32) -> Self {
            Self::at(expiry_day(), hour, minute)
        }

        pub fn set(&self, date: NaiveDate, hour: u32, minute: u32) {
            *self.now.lock() = wall(date, hour, minute);
        }
    }

    impl Clock for FixedClock {
        fn now_utc(&self) -> DateTime<Utc> {
            self.now.lock().and_utc()
        }

        fn zone(&self) -> WallZone {
            WallZone::Fixed(FixedOffset::east_opt(0).unwrap())
        }
    }

    pub fn expiry_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 27).unwrap()
    }

    fn wall(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
        date.and_hms_opt(hour, minute, 0).unwrap()
    }
}
