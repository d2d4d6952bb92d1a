//! Schedule codecs
//!
//! Conversions between weekday sets / times of day and the device's wire
//! encodings: a 7-bit day mask (bit 0 = Monday .. bit 6 = Sunday) and
//! two-digit decimal hour/minute/second fields. Also provides the 7-letter
//! textual day-mask notation used on the command line, where case selects
//! whether a day is active (`MTWTFss` = weekdays on, weekend off).

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors raised while validating schedule inputs, before any wire I/O
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid day mask '{0}': expected 7 letters in MTWTFSS order")]
    BadDayMask(String),

    #[error("invalid time '{0}': expected hh:mm or hh:mm:ss")]
    BadTime(String),

    #[error("{component} out of range: {value}")]
    TimeOutOfRange {
        component: &'static str,
        value: u32,
    },

    #[error("timer slot {0} out of range (valid slots are 1-20)")]
    SlotOutOfRange(u8),
}

/// One weekday, in the device's Monday-first ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    /// All weekdays in mask-bit order
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    /// Bit assigned to this day in the 7-bit mask
    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Uppercase mask letter for this day
    pub fn letter(self) -> char {
        match self {
            Weekday::Mon => 'M',
            Weekday::Tue => 'T',
            Weekday::Wed => 'W',
            Weekday::Thu => 'T',
            Weekday::Fri => 'F',
            Weekday::Sat => 'S',
            Weekday::Sun => 'S',
        }
    }

    /// Three-letter English name, as used in reports and the JSON view
    pub fn name(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of weekdays, stored as the device's 7-bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// The empty set, the canonical "unset" day selection
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    /// Decode a 7-bit mask. Bit 7 is ignored.
    pub fn from_mask(mask: u8) -> Self {
        Self(mask & 0x7f)
    }

    /// Encode to the 7-bit mask
    pub fn mask(self) -> u8 {
        self.0
    }

    /// Set containing a single day
    pub fn single(day: Weekday) -> Self {
        Self(day.bit())
    }

    /// Whether the given day is active
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & day.bit() != 0
    }

    /// Add a day to the set
    pub fn insert(&mut self, day: Weekday) {
        self.0 |= day.bit();
    }

    /// True when no day is active
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active days in Mon..Sun order
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        Weekday::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    /// First active day, if any. The device reports its current weekday as
    /// a one-hot mask, so this recovers the singleton.
    pub fn first(self) -> Option<Weekday> {
        self.iter().next()
    }

    /// Parse the 7-letter textual notation (`MTWTFss`): one letter per day
    /// in Mon..Sun order, uppercase = active, lowercase = inactive.
    pub fn parse_letters(text: &str) -> Result<Self, ScheduleError> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != 7 {
            return Err(ScheduleError::BadDayMask(text.to_string()));
        }
        let mut set = WeekdaySet::EMPTY;
        for (day, ch) in Weekday::ALL.into_iter().zip(chars) {
            if ch.to_ascii_uppercase() != day.letter() {
                return Err(ScheduleError::BadDayMask(text.to_string()));
            }
            if ch.is_ascii_uppercase() {
                set.insert(day);
            }
        }
        Ok(set)
    }

    /// Render the 7-letter textual notation
    pub fn to_letters(self) -> String {
        Weekday::ALL
            .into_iter()
            .map(|d| {
                if self.contains(d) {
                    d.letter()
                } else {
                    d.letter().to_ascii_lowercase()
                }
            })
            .collect()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for day in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(day.name())?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(Weekday::name))
    }
}

/// A clock time with one-second resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
    second: u8,
}

impl TimeOfDay {
    /// 00:00:00, the null schedule time
    pub const MIDNIGHT: TimeOfDay = TimeOfDay {
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Validate and build a time of day
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self, ScheduleError> {
        if hour > 23 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "hour",
                value: hour as u32,
            });
        }
        if minute > 59 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "minute",
                value: minute as u32,
            });
        }
        if second > 59 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "second",
                value: second as u32,
            });
        }
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    /// Parse `hh:mm` or `hh:mm:ss`; seconds default to 0
    pub fn parse(text: &str) -> Result<Self, ScheduleError> {
        let (h, m, s) = parse_clock_fields(text)?;
        Self::new(h, m, s)
    }

    /// Encode to the device's (hour, minute, second) byte triple
    pub fn to_bytes(self) -> [u8; 3] {
        [self.hour, self.minute, self.second]
    }

    /// Decode the device's (hour, minute, second) byte triple
    pub fn from_bytes(bytes: [u8; 3]) -> Result<Self, ScheduleError> {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// Hour, 0-23
    pub fn hour(self) -> u8 {
        self.hour
    }

    /// Minute, 0-59
    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Second, 0-59
    pub fn second(self) -> u8 {
        self.second
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A non-negative duration rendered `HH:MM:SS`, used by the countdown and
/// random-mode slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimeSpan {
    secs: u32,
}

impl TimeSpan {
    /// The zero-length span
    pub const ZERO: TimeSpan = TimeSpan { secs: 0 };

    /// Build from hour/minute/second components
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            secs: hours * 3600 + minutes * 60 + seconds,
        }
    }

    /// Parse `hh:mm` or `hh:mm:ss`. The device cannot hold spans of a day
    /// or longer, so hours are capped at 23.
    pub fn parse(text: &str) -> Result<Self, ScheduleError> {
        let (h, m, s) = parse_clock_fields(text)?;
        if h > 23 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "hour",
                value: h as u32,
            });
        }
        if m > 59 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "minute",
                value: m as u32,
            });
        }
        if s > 59 {
            return Err(ScheduleError::TimeOutOfRange {
                component: "second",
                value: s as u32,
            });
        }
        Ok(Self::from_hms(h as u32, m as u32, s as u32))
    }

    /// Whole-hours component
    pub fn hours(self) -> u32 {
        self.secs / 3600
    }

    /// Minutes component, 0-59
    pub fn minutes(self) -> u32 {
        self.secs % 3600 / 60
    }

    /// Seconds component, 0-59
    pub fn seconds(self) -> u32 {
        self.secs % 60
    }

    /// Subtract, clamping at zero
    pub fn saturating_sub(self, other: TimeSpan) -> TimeSpan {
        TimeSpan {
            secs: self.secs.saturating_sub(other.secs),
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

impl Serialize for TimeSpan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A weekly schedule: the days a slot fires and the time it fires at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Active days
    #[serde(rename = "weekday")]
    pub days: WeekdaySet,
    /// Firing time
    pub time: TimeOfDay,
}

impl Schedule {
    /// The canonical unset schedule: no days, 00:00:00
    pub const UNSET: Schedule = Schedule {
        days: WeekdaySet::EMPTY,
        time: TimeOfDay::MIDNIGHT,
    };

    /// Build a schedule
    pub fn new(days: WeekdaySet, time: TimeOfDay) -> Self {
        Self { days, time }
    }

    /// True when no day is selected; cleared slots report this form
    pub fn is_unset(&self) -> bool {
        self.days.is_empty()
    }
}

fn parse_clock_fields(text: &str) -> Result<(u8, u8, u8), ScheduleError> {
    let bad = || ScheduleError::BadTime(text.to_string());
    let mut parts = text.split(':');
    let hour = parts.next().ok_or_else(bad)?;
    let minute = parts.next().ok_or_else(bad)?;
    let second = parts.next();
    if parts.next().is_some() {
        return Err(bad());
    }
    let parse_field = |field: &str| -> Result<u8, ScheduleError> {
        if field.is_empty() || field.len() > 2 {
            return Err(bad());
        }
        field.parse::<u8>().map_err(|_| bad())
    };
    Ok((
        parse_field(hour)?,
        parse_field(minute)?,
        second.map(parse_field).transpose()?.unwrap_or(0),
    ))
}
