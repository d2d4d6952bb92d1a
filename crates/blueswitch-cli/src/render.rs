//! Text reports
//!
//! Human-readable renderings of the device state snapshot. The JSON view
//! comes straight from the model's serde implementation; these reports are
//! for the plain `-status` and `-timers` outputs.

use std::fmt::Write;

use blueswitch_core::state::DeviceState;

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Render `hh:mm` out of a full clock rendering
fn short_time(value: impl ToString) -> String {
    let text = value.to_string();
    text.strip_suffix(":00").map(str::to_string).unwrap_or(text)
}

/// The `-status` report: identity, status flags and the device clock
pub fn status_report(state: &DeviceState) -> String {
    let mut out = String::new();
    let device = &state.device;

    let _ = writeln!(out, " Address:          {}", device.address);
    let _ = writeln!(out, " PIN:              {}", device.pin);
    let _ = writeln!(
        out,
        " Alias:            {}",
        device.alias.as_deref().unwrap_or("n/a")
    );

    if let Some(status) = &state.status {
        out.push('\n');
        let _ = writeln!(out, " Model:            {}", status.model);
        let _ = writeln!(out, " Serial no.:       {}", status.serial);
        let _ = writeln!(out, " Firmware:         {}", status.firmware);
        out.push('\n');
        let _ = writeln!(out, " Relay:            {}", on_off(status.on));
        let _ = writeln!(out, " Random mode:      {}", on_off(status.random));
        let _ = writeln!(out, " Countdown:        {}", on_off(status.countdown));
        let _ = writeln!(out, " Power:            {}", yes_no(status.power));
        let _ = writeln!(out, " Over temperature: {}", yes_no(status.overtemp));
    }

    if let Some(time) = &state.time {
        out.push('\n');
        let weekday = time
            .weekday
            .first()
            .map(|d| d.name())
            .unwrap_or("???");
        let _ = writeln!(out, " Time:             {}, {}", weekday, time.time);
    }

    out
}

/// The `-timers` report: random mode, countdown and every programmed timer
pub fn timer_report(state: &DeviceState) -> String {
    let mut out = String::new();

    if let Some(random) = &state.random {
        if !random.schedule.is_unset() {
            let _ = writeln!(
                out,
                " Random:           {} on {} for {}, {}{}",
                random.schedule.time,
                random.schedule.days,
                short_time(random.duration),
                if random.active { "active" } else { "inactive" },
                if random.simultaneous {
                    ", simultaneously"
                } else {
                    ""
                },
            );
        }
    }

    if let Some(countdown) = &state.countdown {
        if countdown.active {
            let _ = writeln!(
                out,
                " Countdown:        running, switch {} in {}",
                countdown.action.label(),
                countdown.remaining(),
            );
        }
    }

    for timer in state.programmed_timers() {
        let _ = writeln!(
            out,
            " Timer {:02} ({}):    switch {} at {} on {}",
            timer.slot,
            timer.kind.label(),
            timer.kind.label(),
            short_time(timer.schedule.time),
            timer.schedule.days,
        );
    }

    if out.is_empty() {
        out.push_str(" No timers programmed.\n");
    }

    out
}
