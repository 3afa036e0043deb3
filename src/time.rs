//! Countdown formatting and race status classification.
//!
//! Everything here is a pure function of its inputs; callers pass "now"
//! explicitly (see [`crate::clock`]).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use crate::clock::epoch_secs;
use crate::race::Category;

/// Beyond this many seconds out, a countdown shows the wall-clock start.
pub const CLOCK_TIME_AFTER_SECS: f64 = 1800.0;
/// Beyond this many seconds out, a countdown shows whole minutes only.
pub const MINUTES_ONLY_AFTER_SECS: f64 = 300.0;
/// How long a race counts as `Started` before it is `Finished`.
pub const STARTED_WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Upcoming,
    Started,
    Finished,
}

impl RaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceStatus::Upcoming => "upcoming",
            RaceStatus::Started => "started",
            RaceStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Style tag for a countdown. Boundaries are independent of [`RaceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountdownClass {
    Closed,
    Started,
    Imminent,
    Upcoming,
}

impl CountdownClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountdownClass::Closed => "closed",
            CountdownClass::Started => "started",
            CountdownClass::Imminent => "imminent",
            CountdownClass::Upcoming => "upcoming",
        }
    }
}

impl fmt::Display for CountdownClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render signed seconds-until-start.
///
/// Past starts always render as elapsed minutes/seconds (`-1m 5s`, `-20s`).
/// Far-off starts render as the local start time (`3:45pm`), computed as
/// `now + seconds` in `now`'s time zone.
pub fn format_countdown<Tz>(seconds: f64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let abs = seconds.abs();
    let minutes = (abs / 60.0).floor() as i64;
    let secs = (abs % 60.0).floor() as i64;

    if seconds < 0.0 {
        if minutes == 0 {
            return format!("-{}s", secs);
        }
        return format!("-{}m {}s", minutes, secs);
    }

    if seconds > CLOCK_TIME_AFTER_SECS {
        let ahead = Duration::milliseconds((seconds * 1000.0) as i64);
        // Out of chrono's date range: keep the minutes rendering.
        return match now.clone().checked_add_signed(ahead) {
            Some(at) => at.format("%-I:%M%P").to_string(),
            None => format!("{}m", minutes),
        };
    }

    if seconds > MINUTES_ONLY_AFTER_SECS {
        return format!("{}m", minutes);
    }
    if minutes > 0 {
        return format!("{}m {}s", minutes, secs);
    }
    format!("{}s", secs)
}

pub fn race_status(start_secs: i64, now: &DateTime<Utc>) -> RaceStatus {
    let elapsed = epoch_secs(now) - start_secs as f64;
    if elapsed < 0.0 {
        RaceStatus::Upcoming
    } else if elapsed <= STARTED_WINDOW_SECS {
        RaceStatus::Started
    } else {
        RaceStatus::Finished
    }
}

/// Signed seconds until start; negative once the race has started.
pub fn countdown_seconds(start_secs: i64, now: &DateTime<Utc>) -> f64 {
    start_secs as f64 - epoch_secs(now)
}

pub fn category_name(category_id: &str) -> &'static str {
    Category::from_id(category_id)
        .map(|c| c.name())
        .unwrap_or("Unknown")
}

pub fn countdown_class(seconds: f64) -> CountdownClass {
    if seconds < -60.0 {
        CountdownClass::Closed
    } else if seconds < 0.0 {
        CountdownClass::Started
    } else if seconds <= 60.0 {
        CountdownClass::Imminent
    } else {
        CountdownClass::Upcoming
    }
}
