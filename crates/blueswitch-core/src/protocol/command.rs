//! Logical commands
//!
//! The typed command vocabulary accepted by the queue executor. Each value
//! is one user-level intent; the frame codec turns it into wire text.

use std::time::Duration;

use crate::device::Pin;
use crate::schedule::{Schedule, TimeSpan};
use crate::state::SwitchAction;

/// The reply shape a command expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// An identity/status line (`$BS-21-…`)
    Status,
    /// A plain `$OK` acknowledgment
    Ack,
    /// The fixed-layout slot listing inside an `$OK` acknowledgment
    Listing,
    /// Anything that is not a negative acknowledgment
    Any,
}

/// One queued user-level intent
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the relay on
    PowerOn,
    /// Switch the relay off
    PowerOff,
    /// Read basic status and the device clock
    QueryStatus,
    /// Read all timer, random-mode and countdown slots
    QueryTimers,
    /// Write the local clock into the device
    SyncTime,
    /// Program one weekly timer slot
    ProgramTimer {
        /// User-facing slot number, 1-20
        slot: u8,
        /// On or Off timer space
        kind: SwitchAction,
        /// Days and firing time
        schedule: Schedule,
    },
    /// Reset one timer slot to the null schedule
    ClearTimer {
        /// User-facing slot number, 1-20
        slot: u8,
        /// On or Off timer space
        kind: SwitchAction,
    },
    /// Arm random mode
    ProgramRandom {
        /// Days and window start time
        schedule: Schedule,
        /// Window length (hours and minutes)
        duration: TimeSpan,
    },
    /// Disarm random mode and clear its slot
    ClearRandom,
    /// Start a countdown that switches the relay when it expires
    StartCountdown {
        /// Action taken on expiry
        action: SwitchAction,
        /// Countdown length
        duration: TimeSpan,
    },
    /// Stop and clear the countdown
    ClearCountdown,
    /// Clear every timer slot, random mode and the countdown
    ClearAll,
    /// Replace the device credential
    ChangePin {
        /// The new 4-digit PIN
        new_pin: Pin,
    },
    /// Make the device discoverable for a couple of minutes
    MakeVisible,
    /// Hold the session open idle; no wire I/O. Useful between dependent
    /// commands, e.g. on-then-delayed-off sequences.
    Sleep {
        /// How long to pause
        duration: Duration,
    },
}

impl Command {
    /// Short name used in queue error reports
    pub fn label(&self) -> &'static str {
        match self {
            Command::PowerOn => "on",
            Command::PowerOff => "off",
            Command::QueryStatus => "status",
            Command::QueryTimers => "timers",
            Command::SyncTime => "sync",
            Command::ProgramTimer { .. } => "timer",
            Command::ClearTimer { .. } => "timer-clear",
            Command::ProgramRandom { .. } => "random",
            Command::ClearRandom => "random-clear",
            Command::StartCountdown { .. } => "countdown",
            Command::ClearCountdown => "countdown-clear",
            Command::ClearAll => "clear-all",
            Command::ChangePin { .. } => "pin",
            Command::MakeVisible => "visible",
            Command::Sleep { .. } => "sleep",
        }
    }

    /// True for pseudo-commands that never touch the wire
    pub fn is_local(&self) -> bool {
        matches!(self, Command::Sleep { .. })
    }

    /// The reply shape this command expects
    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Command::PowerOn | Command::PowerOff | Command::QueryStatus | Command::SyncTime => {
                ReplyShape::Status
            }
            Command::QueryTimers => ReplyShape::Listing,
            Command::ProgramTimer { .. }
            | Command::ClearTimer { .. }
            | Command::ProgramRandom { .. }
            | Command::ClearRandom
            | Command::StartCountdown { .. }
            | Command::ClearCountdown
            | Command::ClearAll => ReplyShape::Ack,
            // The device's replies to these are undocumented; accept
            // anything it acknowledges with.
            Command::ChangePin { .. } | Command::MakeVisible => ReplyShape::Any,
            Command::Sleep { .. } => ReplyShape::Any,
        }
    }

    /// Reply timeout for this command, given the session default
    pub fn reply_timeout_ms(&self, default_ms: u64) -> u64 {
        match self {
            // The full slot listing is by far the largest reply
            Command::QueryTimers => default_ms.max(30_000),
            _ => default_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Command::PowerOn.label(), "on");
        assert_eq!(Command::ClearAll.label(), "clear-all");
    }

    #[test]
    fn test_sleep_is_local() {
        let sleep = Command::Sleep {
            duration: Duration::from_secs(1),
        };
        assert!(sleep.is_local());
        assert!(!Command::PowerOn.is_local());
    }

    #[test]
    fn test_reply_shapes() {
        assert_eq!(Command::PowerOn.reply_shape(), ReplyShape::Status);
        assert_eq!(Command::QueryTimers.reply_shape(), ReplyShape::Listing);
        assert_eq!(Command::ClearAll.reply_shape(), ReplyShape::Ack);
    }

    #[test]
    fn test_listing_timeout_floor() {
        assert_eq!(Command::QueryTimers.reply_timeout_ms(5_000), 30_000);
        assert_eq!(Command::PowerOn.reply_timeout_ms(5_000), 5_000);
    }
}
