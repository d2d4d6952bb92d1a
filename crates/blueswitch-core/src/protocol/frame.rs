//! Frame encoding and reply parsing
//!
//! Outgoing frames are short ASCII keywords with space-separated fields,
//! a `#PIN` credential suffix and a CRLF terminator. Replies come in three
//! shapes: an identity/status line starting `$BS-21`, an `$OK`
//! acknowledgment echoing the accepted frame, or an `$ERR` rejection.
//! Anything else is surfaced as an unexpected reply carrying the raw text.
//!
//! Slot addressing: On timers occupy device addresses 1-20, Off timers
//! 21-40, random mode 41 and the countdown 43. The numeric trailer on
//! `SET` frames is a fixed enable marker, carried unchanged for every
//! schedule.

use std::sync::OnceLock;

use regex::Regex;

use super::command::Command;
use super::error::ProtocolError;
use crate::device::Pin;
use crate::schedule::{Schedule, ScheduleError, TimeOfDay, TimeSpan, WeekdaySet};
use crate::state::{
    ClockReading, Countdown, RandomMode, SlotOverview, Status, SwitchAction, TimerSlot,
};

/// Timer slots available per switching kind
pub const TIMER_SLOTS: u8 = 20;

/// Device-internal address of the random-mode slot
pub const RANDOM_SLOT_ADDR: u8 = 41;

/// Device-internal address of the countdown slot
pub const COUNTDOWN_SLOT_ADDR: u8 = 43;

/// Frame terminator in both directions
pub const TERMINATOR: &str = "\r\n";

const IDENTITY_PREFIX: &str = "$BS-21";
const ACK_PREFIX: &str = "$OK";
const NACK_PREFIX: &str = "$ERR";

// Status flag character bits
const FLAG_OVERTEMP: u8 = 0x02;
const FLAG_POWER: u8 = 0x04;
const FLAG_RANDOM: u8 = 0x08;
const FLAG_COUNTDOWN: u8 = 0x10;

// Fixed layout of the slot-listing acknowledgment (terminator stripped)
const LISTING_LEN: usize = 440;
const LISTING_TIMERS: (usize, usize) = (14, 372);
const LISTING_RANDOM: (usize, usize) = (374, 414);
const LISTING_COUNTDOWN: (usize, usize) = (416, 439);

/// Map a user-facing timer slot to its device address
pub fn timer_addr(kind: SwitchAction, slot: u8) -> Result<u8, ScheduleError> {
    if !(1..=TIMER_SLOTS).contains(&slot) {
        return Err(ScheduleError::SlotOutOfRange(slot));
    }
    Ok(match kind {
        SwitchAction::On => slot,
        SwitchAction::Off => slot + TIMER_SLOTS,
    })
}

/// Build the wire frame for one command, credential suffix included but
/// terminator excluded. Local pseudo-commands encode to `None`.
///
/// `now` is only consulted for clock synchronization; pass a fresh sample
/// so a queue that slept still writes the current time.
pub fn encode(
    command: &Command,
    pin: &Pin,
    now: ClockReading,
) -> Result<Option<String>, ScheduleError> {
    let payload = match command {
        Command::PowerOn => "REL1".to_string(),
        Command::PowerOff => "REL0".to_string(),
        Command::QueryStatus => "RELX".to_string(),
        Command::QueryTimers => "INFO".to_string(),
        Command::SyncTime => format!(
            "TIME {:02x} {:02} {:02} {:02}",
            now.weekday.mask(),
            now.time.hour(),
            now.time.minute(),
            now.time.second()
        ),
        Command::ProgramTimer {
            slot,
            kind,
            schedule,
        } => format!(
            "SET{:02} {:02X} {:02} {:02} {:02} 01",
            timer_addr(*kind, *slot)?,
            schedule.days.mask(),
            schedule.time.hour(),
            schedule.time.minute(),
            schedule.time.second()
        ),
        Command::ClearTimer { slot, kind } => format!("CLEAR{:02}", timer_addr(*kind, *slot)?),
        Command::ProgramRandom { schedule, duration } => format!(
            "SET{} {:02X} {:02} {:02} {:02} {:02} 01 00",
            RANDOM_SLOT_ADDR,
            schedule.days.mask(),
            schedule.time.hour(),
            schedule.time.minute(),
            duration.hours(),
            duration.minutes()
        ),
        Command::ClearRandom => format!("CLEAR{}", RANDOM_SLOT_ADDR),
        Command::StartCountdown { action, duration } => format!(
            "SET{} {:02} {:02} {:02} {:02} 01",
            COUNTDOWN_SLOT_ADDR,
            match action {
                SwitchAction::On => 1,
                SwitchAction::Off => 0,
            },
            duration.hours(),
            duration.minutes(),
            duration.seconds()
        ),
        Command::ClearCountdown => format!("CLEAR{}", COUNTDOWN_SLOT_ADDR),
        Command::ClearAll => "CLEAR00".to_string(),
        Command::ChangePin { new_pin } => {
            // The old credential travels in the payload, the new one in the
            // credential suffix.
            return Ok(Some(format!("NEWC #{} #{}", pin, new_pin)));
        }
        Command::MakeVisible => "VISB".to_string(),
        Command::Sleep { .. } => return Ok(None),
    };
    Ok(Some(format!("{payload}#{pin}")))
}

/// A classified device reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Identity/status line with relay state, flags and the device clock
    Status {
        /// Parsed status fields
        status: Status,
        /// Device clock at reply time
        clock: ClockReading,
    },
    /// Positive acknowledgment; `echo` is the full reply line
    Ack {
        /// Raw acknowledgment text, including any echoed frame or payload
        echo: String,
    },
    /// Explicit rejection, most commonly a credential mismatch
    Nack {
        /// Raw rejection text
        raw: String,
    },
}

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\$(BS-21)-([0-9]+)-([01])-(.) (V[0-9]+\.[0-9]+) ([0-9A-Fa-f]{2}) ([0-9]{2}) ([0-9]{2}) ([0-9]{2})",
        )
        .unwrap()
    })
}

/// Classify one raw reply line into the three known shapes. Anything else
/// is an [`ProtocolError::UnexpectedReply`] carrying the raw text.
pub fn classify(raw: &str) -> Result<Reply, ProtocolError> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.starts_with(NACK_PREFIX) {
        return Ok(Reply::Nack {
            raw: line.to_string(),
        });
    }
    if line.starts_with(IDENTITY_PREFIX) {
        let (status, clock) = parse_status_line(line)?;
        return Ok(Reply::Status { status, clock });
    }
    if line.starts_with(ACK_PREFIX) {
        return Ok(Reply::Ack {
            echo: line.to_string(),
        });
    }
    Err(unexpected(line))
}

fn parse_status_line(line: &str) -> Result<(Status, ClockReading), ProtocolError> {
    let caps = status_re().captures(line).ok_or_else(|| unexpected(line))?;
    let flags = caps[4].bytes().next().unwrap_or(0);
    let status = Status {
        model: caps[1].to_string(),
        serial: caps[2].to_string(),
        firmware: caps[5].to_string(),
        on: &caps[3] == "1",
        overtemp: flags & FLAG_OVERTEMP != 0,
        power: flags & FLAG_POWER != 0,
        random: flags & FLAG_RANDOM != 0,
        countdown: flags & FLAG_COUNTDOWN != 0,
    };
    let weekday = WeekdaySet::from_mask(hex_field(&caps[6]).ok_or_else(|| unexpected(line))?);
    let clock = ClockReading {
        weekday,
        time: clock_time(
            dec_field(&caps[7]).ok_or_else(|| unexpected(line))?,
            dec_field(&caps[8]).ok_or_else(|| unexpected(line))?,
            dec_field(&caps[9]).ok_or_else(|| unexpected(line))?,
        ),
    };
    Ok((status, clock))
}

/// Decode the fixed-layout slot listing out of an `$OK` acknowledgment:
/// 40 timer slots, the random slot and the countdown slot.
pub fn parse_overview(line: &str) -> Result<SlotOverview, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with(ACK_PREFIX) || line.len() != LISTING_LEN {
        return Err(unexpected(line));
    }

    let timer_fields = region_fields(line, LISTING_TIMERS).ok_or_else(|| unexpected(line))?;
    if timer_fields.len() < 3 * TIMER_SLOTS as usize * 2 {
        return Err(unexpected(line));
    }
    let mut timers = Vec::with_capacity(2 * TIMER_SLOTS as usize);
    for i in 0..2 * TIMER_SLOTS as usize {
        let days = hex_field(timer_fields[3 * i]).ok_or_else(|| unexpected(line))?;
        let hour = dec_field(timer_fields[3 * i + 1]).ok_or_else(|| unexpected(line))?;
        let minute = dec_field(timer_fields[3 * i + 2]).ok_or_else(|| unexpected(line))?;
        timers.push(TimerSlot {
            slot: (i as u8 % TIMER_SLOTS) + 1,
            kind: if i < TIMER_SLOTS as usize {
                SwitchAction::On
            } else {
                SwitchAction::Off
            },
            schedule: Schedule::new(WeekdaySet::from_mask(days), clock_time(hour, minute, 0)),
        });
    }

    let random_fields = region_fields(line, LISTING_RANDOM).ok_or_else(|| unexpected(line))?;
    if random_fields.len() < 7 {
        return Err(unexpected(line));
    }
    let random = RandomMode {
        slot: RANDOM_SLOT_ADDR,
        active: hex_field(random_fields[5]).ok_or_else(|| unexpected(line))? != 0,
        simultaneous: hex_field(random_fields[6]).ok_or_else(|| unexpected(line))? != 0,
        schedule: Schedule::new(
            WeekdaySet::from_mask(hex_field(random_fields[0]).ok_or_else(|| unexpected(line))?),
            clock_time(
                dec_field(random_fields[1]).ok_or_else(|| unexpected(line))?,
                dec_field(random_fields[2]).ok_or_else(|| unexpected(line))?,
                0,
            ),
        ),
        duration: TimeSpan::from_hms(
            dec_field(random_fields[3]).ok_or_else(|| unexpected(line))? as u32,
            dec_field(random_fields[4]).ok_or_else(|| unexpected(line))? as u32,
            0,
        ),
    };

    let countdown_fields = region_fields(line, LISTING_COUNTDOWN).ok_or_else(|| unexpected(line))?;
    if countdown_fields.len() < 8 {
        return Err(unexpected(line));
    }
    let remaining = TimeSpan::from_hms(
        dec_field(countdown_fields[1]).ok_or_else(|| unexpected(line))? as u32,
        dec_field(countdown_fields[2]).ok_or_else(|| unexpected(line))? as u32,
        dec_field(countdown_fields[3]).ok_or_else(|| unexpected(line))? as u32,
    );
    let original = TimeSpan::from_hms(
        dec_field(countdown_fields[5]).ok_or_else(|| unexpected(line))? as u32,
        dec_field(countdown_fields[6]).ok_or_else(|| unexpected(line))? as u32,
        dec_field(countdown_fields[7]).ok_or_else(|| unexpected(line))? as u32,
    );
    let countdown = Countdown {
        slot: COUNTDOWN_SLOT_ADDR,
        active: hex_field(countdown_fields[4]).ok_or_else(|| unexpected(line))? != 0,
        action: if hex_field(countdown_fields[0]).ok_or_else(|| unexpected(line))? != 0 {
            SwitchAction::On
        } else {
            SwitchAction::Off
        },
        original,
        elapsed: original.saturating_sub(remaining),
    };

    Ok(SlotOverview {
        timers,
        random,
        countdown,
    })
}

fn region_fields(line: &str, (start, end): (usize, usize)) -> Option<Vec<&str>> {
    Some(line.get(start..end)?.split_whitespace().collect())
}

fn hex_field(field: &str) -> Option<u8> {
    u8::from_str_radix(field, 16).ok()
}

fn dec_field(field: &str) -> Option<u8> {
    field.parse().ok()
}

// The device occasionally reports out-of-range clock fields right after a
// power loss; wrap them the way the firmware does instead of failing the
// whole reply.
fn clock_time(hour: u8, minute: u8, second: u8) -> TimeOfDay {
    TimeOfDay::new(hour % 24, minute % 60, second % 60).unwrap_or(TimeOfDay::MIDNIGHT)
}

fn unexpected(raw: &str) -> ProtocolError {
    ProtocolError::UnexpectedReply {
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Weekday;

    fn pin() -> Pin {
        Pin::new("1234").unwrap()
    }

    fn noon_clock() -> ClockReading {
        ClockReading {
            weekday: WeekdaySet::single(Weekday::Tue),
            time: TimeOfDay::new(12, 0, 0).unwrap(),
        }
    }

    fn schedule(mask: u8, hour: u8, minute: u8) -> Schedule {
        Schedule::new(
            WeekdaySet::from_mask(mask),
            TimeOfDay::new(hour, minute, 0).unwrap(),
        )
    }

    fn encode_one(command: Command) -> String {
        encode(&command, &pin(), noon_clock()).unwrap().unwrap()
    }

    #[test]
    fn test_relay_frames() {
        assert_eq!(encode_one(Command::PowerOn), "REL1#1234");
        assert_eq!(encode_one(Command::PowerOff), "REL0#1234");
        assert_eq!(encode_one(Command::QueryStatus), "RELX#1234");
        assert_eq!(encode_one(Command::QueryTimers), "INFO#1234");
    }

    #[test]
    fn test_sync_frame_uses_one_hot_weekday() {
        assert_eq!(encode_one(Command::SyncTime), "TIME 02 12 00 00#1234");
    }

    #[test]
    fn test_timer_frames_address_both_slot_spaces() {
        let on3 = Command::ProgramTimer {
            slot: 3,
            kind: SwitchAction::On,
            schedule: schedule(0x1f, 6, 30),
        };
        assert_eq!(encode_one(on3), "SET03 1F 06 30 00 01#1234");

        let off3 = Command::ProgramTimer {
            slot: 3,
            kind: SwitchAction::Off,
            schedule: schedule(0x1f, 23, 15),
        };
        assert_eq!(encode_one(off3), "SET23 1F 23 15 00 01#1234");

        let clear = Command::ClearTimer {
            slot: 20,
            kind: SwitchAction::Off,
        };
        assert_eq!(encode_one(clear), "CLEAR40#1234");
    }

    #[test]
    fn test_timer_slot_bounds() {
        for slot in [0u8, 21] {
            let command = Command::ClearTimer {
                slot,
                kind: SwitchAction::On,
            };
            assert_eq!(
                encode(&command, &pin(), noon_clock()),
                Err(ScheduleError::SlotOutOfRange(slot))
            );
        }
        assert!(timer_addr(SwitchAction::On, 1).is_ok());
        assert_eq!(timer_addr(SwitchAction::Off, 20).unwrap(), 40);
    }

    #[test]
    fn test_random_and_countdown_frames() {
        let random = Command::ProgramRandom {
            schedule: schedule(0x7f, 18, 0),
            duration: TimeSpan::from_hms(2, 45, 0),
        };
        assert_eq!(encode_one(random), "SET41 7F 18 00 02 45 01 00#1234");
        assert_eq!(encode_one(Command::ClearRandom), "CLEAR41#1234");

        let countdown = Command::StartCountdown {
            action: SwitchAction::Off,
            duration: TimeSpan::from_hms(0, 10, 0),
        };
        assert_eq!(encode_one(countdown), "SET43 00 00 10 00 01#1234");
        assert_eq!(encode_one(Command::ClearCountdown), "CLEAR43#1234");
        assert_eq!(encode_one(Command::ClearAll), "CLEAR00#1234");
    }

    #[test]
    fn test_change_pin_carries_both_credentials() {
        let command = Command::ChangePin {
            new_pin: Pin::new("5678").unwrap(),
        };
        assert_eq!(encode_one(command), "NEWC #1234 #5678");
    }

    #[test]
    fn test_sleep_encodes_to_nothing() {
        let command = Command::Sleep {
            duration: std::time::Duration::from_secs(5),
        };
        assert_eq!(encode(&command, &pin(), noon_clock()), Ok(None));
    }

    #[test]
    fn test_classify_status_line() {
        let line = "$BS-21-004593-1-\x1E V1.18 02 05 41 59";
        let reply = classify(line).unwrap();
        match reply {
            Reply::Status { status, clock } => {
                assert_eq!(status.model, "BS-21");
                assert_eq!(status.serial, "004593");
                assert_eq!(status.firmware, "V1.18");
                assert!(status.on);
                assert!(status.overtemp);
                assert!(status.power);
                assert!(status.random);
                assert!(status.countdown);
                assert_eq!(clock.weekday.first(), Some(Weekday::Tue));
                assert_eq!(clock.time, TimeOfDay::new(5, 41, 59).unwrap());
            }
            other => panic!("expected status reply, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_flags_clear() {
        let line = "$BS-21-004593-0-\x04 V1.18 01 00 00 00";
        match classify(line).unwrap() {
            Reply::Status { status, clock } => {
                assert!(!status.on);
                assert!(!status.overtemp);
                assert!(status.power);
                assert!(!status.random);
                assert!(!status.countdown);
                assert_eq!(clock.weekday.first(), Some(Weekday::Mon));
            }
            other => panic!("expected status reply, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_ack_and_nack() {
        assert!(matches!(
            classify("$OK SET43 00 00 10 00 01#1234|SET43 00 00 10 00 16\r\n"),
            Ok(Reply::Ack { .. })
        ));
        assert!(matches!(
            classify("$ERR\r\n"),
            Ok(Reply::Nack { .. })
        ));
    }

    #[test]
    fn test_classify_garbage_is_unexpected() {
        assert!(matches!(
            classify("hello world"),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
        assert!(matches!(
            classify(""),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
        // Identity prefix with a mangled body must not panic
        assert!(matches!(
            classify("$BS-21-xyz"),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
    }

    // Assemble a listing line with the device's fixed layout: a 14-char
    // header, 40 timer records, the random record and the countdown record.
    fn listing_line(
        timer_fields: &[String],
        random_fields: &[&str],
        countdown_fields: &[&str],
    ) -> String {
        assert_eq!(timer_fields.len(), 120);
        let mut timers = timer_fields.join(" ");
        timers.truncate(LISTING_TIMERS.1 - LISTING_TIMERS.0);
        assert_eq!(timers.len(), LISTING_TIMERS.1 - LISTING_TIMERS.0);

        let mut random = random_fields.join(" ");
        while random.len() < LISTING_RANDOM.1 - LISTING_RANDOM.0 {
            random.push(' ');
        }

        let countdown = countdown_fields.join(" ");
        assert_eq!(countdown.len(), LISTING_COUNTDOWN.1 - LISTING_COUNTDOWN.0);

        let line = format!("$OK INFO      {timers}| {random}| {countdown}|");
        assert_eq!(line.len(), LISTING_LEN);
        line
    }

    fn empty_timer_fields() -> Vec<String> {
        // 120 fields of "00"; the layout truncates the last one to a single
        // character, which still parses as zero.
        vec!["00".to_string(); 120]
    }

    #[test]
    fn test_parse_overview_cleared_device() {
        let line = listing_line(
            &empty_timer_fields(),
            &["00", "00", "00", "00", "00", "00", "00"],
            &["00", "00", "00", "00", "00", "00", "00", "00"],
        );
        let overview = parse_overview(&line).unwrap();
        assert_eq!(overview.timers.len(), 40);
        assert!(overview.timers.iter().all(|t| t.schedule.is_unset()));
        assert_eq!(overview.timers[0].slot, 1);
        assert_eq!(overview.timers[0].kind, SwitchAction::On);
        assert_eq!(overview.timers[39].slot, 20);
        assert_eq!(overview.timers[39].kind, SwitchAction::Off);
        assert!(!overview.random.active);
        assert!(!overview.countdown.active);
        assert_eq!(overview.countdown.remaining(), TimeSpan::ZERO);
    }

    #[test]
    fn test_parse_overview_programmed_slots() {
        let mut timer_fields = empty_timer_fields();
        // On timer 2: weekdays at 06:30
        timer_fields[3] = "1F".to_string();
        timer_fields[4] = "06".to_string();
        timer_fields[5] = "30".to_string();
        // Off timer 1 (device address 21): every day at 23:00
        timer_fields[60] = "7F".to_string();
        timer_fields[61] = "23".to_string();
        timer_fields[62] = "00".to_string();

        let line = listing_line(
            &timer_fields,
            &["1F", "18", "30", "02", "00", "01", "00"],
            &["01", "07", "02", "37", "01", "07", "26", "13"],
        );
        let overview = parse_overview(&line).unwrap();

        let on2 = &overview.timers[1];
        assert_eq!(on2.slot, 2);
        assert_eq!(on2.kind, SwitchAction::On);
        assert_eq!(on2.schedule.days.mask(), 0x1f);
        assert_eq!(on2.schedule.time, TimeOfDay::new(6, 30, 0).unwrap());

        let off1 = &overview.timers[20];
        assert_eq!(off1.slot, 1);
        assert_eq!(off1.kind, SwitchAction::Off);
        assert_eq!(off1.schedule.days.mask(), 0x7f);

        assert!(overview.random.active);
        assert!(!overview.random.simultaneous);
        assert_eq!(overview.random.schedule.time, TimeOfDay::new(18, 30, 0).unwrap());
        assert_eq!(overview.random.duration, TimeSpan::from_hms(2, 0, 0));

        assert!(overview.countdown.active);
        assert_eq!(overview.countdown.action, SwitchAction::On);
        assert_eq!(overview.countdown.original, TimeSpan::from_hms(7, 26, 13));
        assert_eq!(overview.countdown.elapsed, TimeSpan::from_hms(0, 23, 36));
        assert_eq!(overview.countdown.remaining(), TimeSpan::from_hms(7, 2, 37));
    }

    #[test]
    fn test_parse_overview_rejects_short_reply() {
        assert!(matches!(
            parse_overview("$OK INFO"),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
        assert!(matches!(
            parse_overview("$ERR"),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
    }
}
