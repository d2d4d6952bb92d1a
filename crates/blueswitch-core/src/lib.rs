//! # Blueswitch Core Library
//!
//! Protocol engine for BS-21 Bluetooth power outlets.

#![warn(missing_docs)]

//!
//! This library provides:
//! - Schedule codecs (weekday masks, times of day, durations)
//! - Frame encoding and reply parsing for the device's text protocol
//! - A line-oriented connection session over a serial-over-RFCOMM tty
//! - A sequential command queue executor with fail-fast semantics
//! - A typed, serializable device state snapshot
//!
//! ## Example
//!
//! ```rust,ignore
//! use blueswitch_core::prelude::*;
//!
//! let handle = DeviceHandle::new("5C:B6:CC:00:1A:AE", "1234")?;
//! let mut executor = QueueExecutor::new(handle, SessionConfig::default());
//! executor.run(&[Command::PowerOn, Command::QueryStatus])?;
//! println!("{}", serde_json::to_string_pretty(executor.model())?);
//! ```

pub mod device;
pub mod protocol;
pub mod schedule;
pub mod state;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{BdAddr, DeviceError, DeviceHandle, Pin};
    pub use crate::protocol::{
        Command, ExecutorState, ProtocolError, QueueError, QueueExecutor, QueueSummary, Reply,
        Session, SessionConfig,
    };
    pub use crate::schedule::{
        Schedule, ScheduleError, TimeOfDay, TimeSpan, Weekday, WeekdaySet,
    };
    pub use crate::state::{
        ClockReading, Countdown, DeviceState, RandomMode, SlotOverview, Status, SwitchAction,
        TimerSlot,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
