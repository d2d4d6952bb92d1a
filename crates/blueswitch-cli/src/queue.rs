//! Command queue tokens
//!
//! Turns the trailing command-line tokens (`-on -sleep 5 -off …`) into the
//! engine's typed command list, validating arity and formats up front so
//! nothing malformed reaches the executor.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Timelike;

use blueswitch_core::device::Pin;
use blueswitch_core::protocol::Command;
use blueswitch_core::schedule::{Schedule, TimeOfDay, TimeSpan, WeekdaySet};
use blueswitch_core::state::SwitchAction;

/// Command table shown under `--help`
pub const COMMAND_HELP: &str = "\
Commands are executed in the given order over one connection:
  -on                                power switch on
  -off                               power switch off
  -status                            read and print basic status
  -timers                            read and print all timer information
  -sync                              synchronize the device clock
  -timer <n> <on|off> <mask> <hh:mm>
                                     program timer slot n (1-20); mask is one
                                     letter per day Mon..Sun, uppercase =
                                     active (e.g. MTWTFss)
  -timer-clear <n> <on|off>          reset one timer slot
  -random <mask> <hh:mm> <hh:mm>     arm random mode: days, start, duration
  -random-clear                      disarm random mode
  -countdown-for <on|off> <hh:mm[:ss]>
                                     start countdown with a duration
  -countdown-until <on|off> <hh:mm>  start countdown ending at a clock time
  -countdown-clear                   stop the countdown
  -clear-all                         clear all timers, random mode, countdown
  -pin <nnnn>                        set a new 4-digit PIN
  -visible                           make the device discoverable
  -sleep <seconds>                   stay connected and pause
  -json                              query everything, print JSON at the end
";

/// A parsed queue plus the output the user asked for
#[derive(Debug, Default)]
pub struct ParsedQueue {
    /// Typed commands, in input order
    pub commands: Vec<Command>,
    /// Print the status report after the run
    pub show_status: bool,
    /// Print the timer report after the run
    pub show_timers: bool,
    /// Print the JSON snapshot after the run
    pub json: bool,
}

/// Parse the trailing command tokens
pub fn parse_tokens(tokens: &[String]) -> Result<ParsedQueue> {
    let mut queue = ParsedQueue::default();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        let name = token
            .strip_prefix('-')
            .ok_or_else(|| anyhow!("expected a command, got '{token}'"))?;
        match name {
            "on" => queue.commands.push(Command::PowerOn),
            "off" => queue.commands.push(Command::PowerOff),
            "status" => {
                queue.commands.push(Command::QueryStatus);
                queue.show_status = true;
            }
            "timers" => {
                queue.commands.push(Command::QueryTimers);
                queue.show_timers = true;
            }
            "sync" => queue.commands.push(Command::SyncTime),
            "timer" => {
                let slot = parse_slot(&mut iter, name)?;
                let kind = parse_action(&mut iter, name)?;
                let days = parse_day_mask(&mut iter, name)?;
                let time = parse_clock(&mut iter, name)?;
                queue.commands.push(Command::ProgramTimer {
                    slot,
                    kind,
                    schedule: Schedule::new(days, time),
                });
            }
            "timer-clear" => {
                let slot = parse_slot(&mut iter, name)?;
                let kind = parse_action(&mut iter, name)?;
                queue.commands.push(Command::ClearTimer { slot, kind });
            }
            "random" => {
                let days = parse_day_mask(&mut iter, name)?;
                let start = parse_clock(&mut iter, name)?;
                let duration = parse_span(&mut iter, name)?;
                queue.commands.push(Command::ProgramRandom {
                    schedule: Schedule::new(days, start),
                    duration,
                });
            }
            "random-clear" => queue.commands.push(Command::ClearRandom),
            "countdown-for" => {
                let action = parse_action(&mut iter, name)?;
                let duration = parse_span(&mut iter, name)?;
                queue
                    .commands
                    .push(Command::StartCountdown { action, duration });
            }
            "countdown-until" => {
                let action = parse_action(&mut iter, name)?;
                let end = parse_clock(&mut iter, name)?;
                queue.commands.push(Command::StartCountdown {
                    action,
                    duration: duration_until(end, chrono::Local::now().time()),
                });
            }
            "countdown-clear" => queue.commands.push(Command::ClearCountdown),
            "clear-all" => queue.commands.push(Command::ClearAll),
            "pin" => {
                let digits = next_arg(&mut iter, name, "<nnnn>")?;
                let new_pin = Pin::new(digits).map_err(|e| usage_error(name, e))?;
                queue.commands.push(Command::ChangePin { new_pin });
            }
            "visible" => queue.commands.push(Command::MakeVisible),
            "sleep" => {
                let seconds: u64 = next_arg(&mut iter, name, "<seconds>")?
                    .parse()
                    .map_err(|_| anyhow!("-sleep takes a number of seconds"))?;
                queue.commands.push(Command::Sleep {
                    duration: Duration::from_secs(seconds),
                });
            }
            "json" => {
                queue.commands.push(Command::QueryStatus);
                queue.commands.push(Command::QueryTimers);
                queue.json = true;
            }
            other => bail!("unknown command '-{other}'; see --help"),
        }
    }

    Ok(queue)
}

/// Seconds from `now` until the next occurrence of `end`, as a span.
/// An end time earlier than now rolls over to tomorrow.
fn duration_until(end: TimeOfDay, now: chrono::NaiveTime) -> TimeSpan {
    let end_secs =
        end.hour() as u32 * 3600 + end.minute() as u32 * 60 + end.second() as u32;
    let now_secs = now.num_seconds_from_midnight();
    let span = (end_secs + 86_400 - now_secs) % 86_400;
    TimeSpan::from_hms(0, 0, span)
}

fn next_arg<'a>(
    iter: &mut std::slice::Iter<'a, String>,
    command: &str,
    placeholder: &str,
) -> Result<&'a str> {
    match iter.next() {
        Some(token) if !token.starts_with('-') => Ok(token),
        _ => bail!("-{command} is missing its {placeholder} parameter; see --help"),
    }
}

fn usage_error(command: &str, cause: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("-{command}: {cause}")
}

fn parse_slot(iter: &mut std::slice::Iter<'_, String>, command: &str) -> Result<u8> {
    next_arg(iter, command, "<n>")?
        .parse()
        .map_err(|_| anyhow!("-{command} takes a slot number from 1 to 20"))
}

fn parse_action(
    iter: &mut std::slice::Iter<'_, String>,
    command: &str,
) -> Result<SwitchAction> {
    match next_arg(iter, command, "<on|off>")? {
        "on" => Ok(SwitchAction::On),
        "off" => Ok(SwitchAction::Off),
        other => bail!("-{command}: expected 'on' or 'off', got '{other}'"),
    }
}

fn parse_day_mask(
    iter: &mut std::slice::Iter<'_, String>,
    command: &str,
) -> Result<WeekdaySet> {
    let mask = next_arg(iter, command, "<mask>")?;
    WeekdaySet::parse_letters(mask).map_err(|e| usage_error(command, e))
}

fn parse_clock(
    iter: &mut std::slice::Iter<'_, String>,
    command: &str,
) -> Result<TimeOfDay> {
    let text = next_arg(iter, command, "<hh:mm>")?;
    TimeOfDay::parse(text).map_err(|e| usage_error(command, e))
}

fn parse_span(
    iter: &mut std::slice::Iter<'_, String>,
    command: &str,
) -> Result<TimeSpan> {
    let text = next_arg(iter, command, "<hh:mm>")?;
    TimeSpan::parse(text).map_err(|e| usage_error(command, e))
}
