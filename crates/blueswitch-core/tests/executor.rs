//! Queue execution against a scripted in-memory transport

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blueswitch_core::device::DeviceHandle;
use blueswitch_core::protocol::{
    Command, ExecutorState, ProtocolError, QueueExecutor, SessionConfig, Transport,
};
use blueswitch_core::schedule::{Schedule, TimeOfDay, TimeSpan, WeekdaySet};
use blueswitch_core::state::SwitchAction;
use pretty_assertions::assert_eq;

/// What the scripted transport observed, shared with the test body
#[derive(Default)]
struct TransportLog {
    sent: Vec<u8>,
    drops: usize,
}

impl TransportLog {
    fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.sent)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// In-memory transport that replays a fixed reply script
struct ScriptedTransport {
    replies: Vec<u8>,
    cursor: usize,
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    fn new(replies: &[&str]) -> (Self, Arc<Mutex<TransportLog>>) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        let mut script = Vec::new();
        for reply in replies {
            script.extend_from_slice(reply.as_bytes());
            script.extend_from_slice(b"\r\n");
        }
        (
            Self {
                replies: script,
                cursor: 0,
                log: log.clone(),
            },
            log,
        )
    }
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.log.lock().unwrap().sent.extend_from_slice(buf);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.replies[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok((self.replies.len() - self.cursor) as u32)
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.log.lock().unwrap().drops += 1;
    }
}

const STATUS_LINE: &str = "$BS-21-004593-1-\x04 V1.18 02 12 30 00";
const ACK_LINE: &str = "$OK SET43 00 00 10 00 01#1234|SET43 00 00 10 00 16";

fn handle() -> DeviceHandle {
    DeviceHandle::new("5C:B6:CC:00:1A:AE", "1234").unwrap()
}

fn config() -> SessionConfig {
    SessionConfig {
        reply_timeout_ms: 200,
        ..SessionConfig::default()
    }
}

#[test]
fn acknowledged_queue_runs_in_order_and_closes_once() {
    let (transport, log) = ScriptedTransport::new(&[STATUS_LINE, STATUS_LINE, ACK_LINE]);
    let mut executor = QueueExecutor::new(handle(), config());
    assert_eq!(executor.state(), ExecutorState::Idle);

    let commands = [
        Command::PowerOn,
        Command::SyncTime,
        Command::StartCountdown {
            action: SwitchAction::Off,
            duration: TimeSpan::from_hms(0, 10, 0),
        },
    ];
    let summary = executor.run_with_transport(Box::new(transport), &commands).unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(executor.state(), ExecutorState::Done);

    let log = log.lock().unwrap();
    let lines = log.sent_lines();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "REL1#1234");
    assert!(lines[1].starts_with("TIME "));
    assert!(lines[1].ends_with("#1234"));
    assert_eq!(lines[2], "SET43 00 00 10 00 01#1234");
    assert_eq!(log.drops, 1, "session must be closed exactly once");

    // The status replies populated the model
    let model = executor.model();
    assert!(model.status.as_ref().unwrap().on);
    assert_eq!(model.time.unwrap().time, TimeOfDay::new(12, 30, 0).unwrap());
}

#[test]
fn negative_ack_aborts_remaining_queue() {
    let (transport, log) = ScriptedTransport::new(&[STATUS_LINE, "$ERR"]);
    let mut executor = QueueExecutor::new(handle(), config());

    let commands = [
        Command::PowerOn,
        Command::ProgramTimer {
            slot: 3,
            kind: SwitchAction::On,
            schedule: Schedule::new(
                WeekdaySet::parse_letters("MTWTFss").unwrap(),
                TimeOfDay::new(6, 30, 0).unwrap(),
            ),
        },
        Command::PowerOff,
    ];
    let error = executor
        .run_with_transport(Box::new(transport), &commands)
        .unwrap_err();

    assert_eq!(error.index, 1);
    assert_eq!(error.label, "timer");
    assert_eq!(error.completed, 1);
    assert!(matches!(error.source, ProtocolError::NegativeAck));
    assert_eq!(executor.state(), ExecutorState::Failed);

    let log = log.lock().unwrap();
    let lines = log.sent_lines();
    assert_eq!(lines.len(), 2, "third command must never be sent");
    assert_eq!(lines[0], "REL1#1234");
    assert_eq!(lines[1], "SET03 1F 06 30 00 01#1234");
    assert_eq!(log.drops, 1);
}

#[test]
fn invalid_slot_fails_before_any_wire_io() {
    let (transport, log) = ScriptedTransport::new(&[]);
    let mut executor = QueueExecutor::new(handle(), config());

    let commands = [Command::ClearTimer {
        slot: 21,
        kind: SwitchAction::On,
    }];
    let error = executor
        .run_with_transport(Box::new(transport), &commands)
        .unwrap_err();

    assert!(matches!(error.source, ProtocolError::Schedule(_)));
    assert_eq!(error.completed, 0);

    let log = log.lock().unwrap();
    assert!(log.sent.is_empty(), "nothing may reach the device");
    assert_eq!(log.drops, 1);
}

#[test]
fn sleep_holds_session_without_wire_io() {
    let (transport, log) = ScriptedTransport::new(&[STATUS_LINE, STATUS_LINE]);
    let mut executor = QueueExecutor::new(handle(), config());

    let commands = [
        Command::PowerOn,
        Command::Sleep {
            duration: Duration::from_millis(10),
        },
        Command::PowerOff,
    ];
    let summary = executor.run_with_transport(Box::new(transport), &commands).unwrap();

    assert_eq!(summary.completed, 3);
    let log = log.lock().unwrap();
    assert_eq!(log.sent_lines(), vec!["REL1#1234", "REL0#1234"]);
}

#[test]
fn clearing_a_cleared_slot_is_not_an_error() {
    let (transport, log) = ScriptedTransport::new(&[ACK_LINE, ACK_LINE]);
    let mut executor = QueueExecutor::new(handle(), config());

    let clear = Command::ClearTimer {
        slot: 7,
        kind: SwitchAction::Off,
    };
    let summary = executor
        .run_with_transport(Box::new(transport), &[clear.clone(), clear])
        .unwrap();

    assert_eq!(summary.completed, 2);
    let log = log.lock().unwrap();
    assert_eq!(log.sent_lines(), vec!["CLEAR27#1234", "CLEAR27#1234"]);
}

#[test]
fn unexpected_reply_carries_raw_text() {
    let (transport, _log) = ScriptedTransport::new(&["BOOT?"]);
    let mut executor = QueueExecutor::new(handle(), config());

    let error = executor
        .run_with_transport(Box::new(transport), &[Command::PowerOn])
        .unwrap_err();
    match error.source {
        ProtocolError::UnexpectedReply { raw } => assert_eq!(raw, "BOOT?"),
        other => panic!("expected unexpected-reply, got {other:?}"),
    }
}

#[test]
fn timeout_fails_the_issuing_command() {
    let (transport, _log) = ScriptedTransport::new(&[]);
    let mut executor = QueueExecutor::new(handle(), config());

    let error = executor
        .run_with_transport(Box::new(transport), &[Command::QueryStatus])
        .unwrap_err();
    assert!(matches!(error.source, ProtocolError::Timeout { .. }));
    assert_eq!(executor.state(), ExecutorState::Failed);
}

#[test]
fn empty_queue_is_a_no_op() {
    let mut executor = QueueExecutor::new(handle(), config());
    let summary = executor.run(&[]).unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(executor.state(), ExecutorState::Idle);
}

#[test]
fn trace_records_every_frame_verbatim() {
    let (transport, _log) = ScriptedTransport::new(&[STATUS_LINE, "$ERR"]);
    let mut executor = QueueExecutor::new(handle(), config());

    let _ = executor.run_with_transport(
        Box::new(transport),
        &[Command::PowerOn, Command::ClearAll, Command::PowerOff],
    );

    let trace = executor.trace();
    let raw: Vec<&str> = trace.iter().map(|t| t.raw.as_str()).collect();
    assert_eq!(
        raw,
        vec!["REL1#1234", STATUS_LINE, "CLEAR00#1234", "$ERR"],
        "trace must keep rejected exchanges too"
    );
}
