//! Device state model
//!
//! The typed snapshot assembled from parsed replies during one queue
//! execution: relay status, the 40 timer slots, the random-mode and
//! countdown slots, the device clock, and the identity the connection was
//! made under. Pure assembly and query; the only computation here is the
//! countdown remaining-time derivation.
//!
//! The `serde` view of [`DeviceState`] is the documented structured-output
//! schema consumed by the JSON formatter.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::device::DeviceHandle;
use crate::schedule::{Schedule, TimeOfDay, TimeSpan, Weekday, WeekdaySet};

/// Whether a switching operation turns the relay on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchAction {
    On,
    Off,
}

impl SwitchAction {
    /// Lowercase label, as rendered in reports and the JSON view
    pub fn label(self) -> &'static str {
        match self {
            SwitchAction::On => "on",
            SwitchAction::Off => "off",
        }
    }
}

/// Basic device status, rebuilt on every status-bearing reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Model token reported by the device, e.g. `BS-21`
    pub model: String,
    /// Serial number
    pub serial: String,
    /// Firmware version, e.g. `V1.18`
    pub firmware: String,
    /// Relay currently conducting
    pub on: bool,
    /// Over-temperature protection tripped
    pub overtemp: bool,
    /// Mains power present at the outlet
    pub power: bool,
    /// Random mode currently active
    pub random: bool,
    /// Countdown currently running
    pub countdown: bool,
}

/// The device clock: current weekday (a one-day set) and time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    /// Current weekday; the device reports exactly one
    pub weekday: WeekdaySet,
    /// Current time
    pub time: TimeOfDay,
}

impl ClockReading {
    /// Sample the local system clock, for synchronizing the device
    pub fn now() -> Self {
        use chrono::{Datelike, Local, Timelike};
        let now = Local::now();
        let weekday = Weekday::ALL[now.weekday().num_days_from_monday() as usize];
        Self {
            weekday: WeekdaySet::single(weekday),
            // Range is guaranteed by the source clock
            time: TimeOfDay::new(now.hour() as u8, now.minute() as u8, now.second() as u8)
                .unwrap_or(TimeOfDay::MIDNIGHT),
        }
    }
}

/// One of the 40 weekly timer slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerSlot {
    /// User-facing slot number, 1-20 within each kind
    pub slot: u8,
    /// Whether firing turns the relay on or off
    #[serde(rename = "type")]
    pub kind: SwitchAction,
    /// Firing schedule; unset (empty day set) for cleared slots
    pub schedule: Schedule,
}

/// The random-activation slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomMode {
    /// Device-internal slot address
    pub slot: u8,
    /// Random mode armed
    pub active: bool,
    /// Runs alongside timers instead of replacing them
    #[serde(rename = "simultaneously")]
    pub simultaneous: bool,
    /// Start schedule
    pub schedule: Schedule,
    /// Activity window length
    pub duration: TimeSpan,
}

/// The countdown slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    /// Device-internal slot address
    pub slot: u8,
    /// Countdown currently running
    pub active: bool,
    /// Action taken when the countdown expires
    pub action: SwitchAction,
    /// Programmed length
    pub original: TimeSpan,
    /// Time already run down
    pub elapsed: TimeSpan,
}

impl Countdown {
    /// Time left until the countdown fires, clamped at zero
    pub fn remaining(&self) -> TimeSpan {
        self.original.saturating_sub(self.elapsed)
    }
}

impl Serialize for Countdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Countdown", 6)?;
        s.serialize_field("slot", &self.slot)?;
        s.serialize_field("active", &self.active)?;
        s.serialize_field("type", self.action.label())?;
        s.serialize_field("remaining", &self.remaining())?;
        s.serialize_field("elapsed", &self.elapsed)?;
        s.serialize_field("original", &self.original)?;
        s.end()
    }
}

/// The slot listing decoded from one full-state query: all 40 timers plus
/// the random and countdown slots
#[derive(Debug, Clone, PartialEq)]
pub struct SlotOverview {
    /// All timer slots, On 1-20 then Off 1-20
    pub timers: Vec<TimerSlot>,
    /// Random-mode slot
    pub random: RandomMode,
    /// Countdown slot
    pub countdown: Countdown,
}

/// Snapshot of everything learned from the device during one queue
/// execution. Sections start unpopulated and are filled in only by
/// commands actually issued; nothing is carried over between invocations.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    /// Identity the session was opened under
    pub device: DeviceHandle,
    /// Basic status, after any status-bearing command
    pub status: Option<Status>,
    /// Device clock, after any status-bearing command
    pub time: Option<ClockReading>,
    /// Timer slots, after a slot-listing query; empty until then
    pub timers: Vec<TimerSlot>,
    /// Random-mode slot, after a slot-listing query
    pub random: Option<RandomMode>,
    /// Countdown slot, after a slot-listing query
    pub countdown: Option<Countdown>,
}

impl DeviceState {
    /// Fresh, unpopulated snapshot for one invocation
    pub fn new(device: DeviceHandle) -> Self {
        Self {
            device,
            status: None,
            time: None,
            timers: Vec::new(),
            random: None,
            countdown: None,
        }
    }

    /// Record a status-bearing reply
    pub fn apply_status(&mut self, status: Status, clock: ClockReading) {
        self.status = Some(status);
        self.time = Some(clock);
    }

    /// Record a decoded slot listing
    pub fn apply_overview(&mut self, overview: SlotOverview) {
        self.timers = overview.timers;
        self.random = Some(overview.random);
        self.countdown = Some(overview.countdown);
    }

    /// Look up a timer slot by kind and user-facing number
    pub fn timer(&self, kind: SwitchAction, slot: u8) -> Option<&TimerSlot> {
        self.timers
            .iter()
            .find(|t| t.kind == kind && t.slot == slot)
    }

    /// Timer slots whose schedule is set
    pub fn programmed_timers(&self) -> impl Iterator<Item = &TimerSlot> {
        self.timers.iter().filter(|t| !t.schedule.is_unset())
    }
}
