//! Command queue execution
//!
//! Runs an ordered list of logical commands over exactly one session.
//! Connection setup dominates the latency of an invocation, so it is paid
//! once for the whole queue. Commands are processed strictly in input
//! order; the device acknowledges each request before the next one is safe
//! to send, so there is no pipelining. The first failure aborts the rest
//! of the queue — the protocol has no transactions, and effects of already
//! completed commands stay on the device.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::command::{Command, ReplyShape};
use super::error::ProtocolError;
use super::frame::{self, Reply};
use super::session::{Session, SessionConfig, TraceEntry, Transport};
use crate::device::{DeviceHandle, Pin};
use crate::state::{ClockReading, DeviceState};

/// Executor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// No queue accepted yet
    Idle,
    /// Opening the session
    Connecting,
    /// Working through the queue
    Executing,
    /// Releasing the session
    Closing,
    /// Queue finished without error
    Done,
    /// Queue aborted; see the returned [`QueueError`]
    Failed,
}

/// Report for a queue that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    /// Number of commands executed
    pub completed: usize,
}

/// Which command failed, and why. Commands before `index` completed and
/// their effects remain on the device; commands after it never ran.
#[derive(Debug, Error)]
#[error("command #{} ({label}) failed: {source}", .index + 1)]
pub struct QueueError {
    /// Zero-based position of the failing command
    pub index: usize,
    /// Short name of the failing command
    pub label: &'static str,
    /// Number of commands that completed before the failure
    pub completed: usize,
    /// Classified cause, carrying raw diagnostics where available
    #[source]
    pub source: ProtocolError,
}

/// Drives one command queue over one session and accumulates the device
/// state snapshot
pub struct QueueExecutor {
    handle: DeviceHandle,
    config: SessionConfig,
    state: ExecutorState,
    model: DeviceState,
    trace: Vec<TraceEntry>,
}

impl QueueExecutor {
    /// New executor for one invocation against one device
    pub fn new(handle: DeviceHandle, config: SessionConfig) -> Self {
        let model = DeviceState::new(handle.clone());
        Self {
            handle,
            config,
            state: ExecutorState::Idle,
            model,
            trace: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// The snapshot assembled so far
    pub fn model(&self) -> &DeviceState {
        &self.model
    }

    /// Verbatim traffic of the finished queue
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Open a session from the configuration and run the queue over it
    pub fn run(&mut self, commands: &[Command]) -> Result<QueueSummary, QueueError> {
        if commands.is_empty() {
            return Ok(QueueSummary { completed: 0 });
        }
        self.state = ExecutorState::Connecting;
        let session = match Session::open(&self.handle.address, &self.config) {
            Ok(session) => session,
            Err(source) => {
                self.state = ExecutorState::Failed;
                return Err(QueueError {
                    index: 0,
                    label: commands[0].label(),
                    completed: 0,
                    source,
                });
            }
        };
        self.execute(session, commands)
    }

    /// Run the queue over an already-open transport. Used by tests and by
    /// callers that manage the tty themselves.
    pub fn run_with_transport(
        &mut self,
        transport: Box<dyn Transport>,
        commands: &[Command],
    ) -> Result<QueueSummary, QueueError> {
        if commands.is_empty() {
            return Ok(QueueSummary { completed: 0 });
        }
        self.state = ExecutorState::Connecting;
        self.execute(Session::from_transport(transport), commands)
    }

    fn execute(
        &mut self,
        mut session: Session,
        commands: &[Command],
    ) -> Result<QueueSummary, QueueError> {
        self.state = ExecutorState::Executing;
        // The working credential; replaced mid-queue by a successful PIN
        // change so later commands authenticate with the new value.
        let mut pin = self.handle.pin.clone();

        let mut completed = 0;
        let mut failure = None;
        for (index, command) in commands.iter().enumerate() {
            debug!(index, label = command.label(), "executing command");
            match self.execute_one(&mut session, &mut pin, command) {
                Ok(()) => completed += 1,
                Err(source) => {
                    failure = Some(QueueError {
                        index,
                        label: command.label(),
                        completed,
                        source,
                    });
                    break;
                }
            }
        }

        self.state = ExecutorState::Closing;
        session.close();
        self.trace = session.take_trace();

        match failure {
            None => {
                self.state = ExecutorState::Done;
                Ok(QueueSummary { completed })
            }
            Some(error) => {
                self.state = ExecutorState::Failed;
                Err(error)
            }
        }
    }

    fn execute_one(
        &mut self,
        session: &mut Session,
        pin: &mut Pin,
        command: &Command,
    ) -> Result<(), ProtocolError> {
        if let Command::Sleep { duration } = command {
            debug!(?duration, "holding session open idle");
            std::thread::sleep(*duration);
            return Ok(());
        }

        let Some(wire) = frame::encode(command, pin, ClockReading::now())? else {
            return Ok(());
        };
        session.send_line(&wire)?;

        let timeout = Duration::from_millis(command.reply_timeout_ms(self.config.reply_timeout_ms));
        let raw = session.receive_line(timeout)?;

        match (command.reply_shape(), frame::classify(&raw)?) {
            (_, Reply::Nack { raw }) => {
                debug!(%raw, "device rejected request");
                Err(ProtocolError::NegativeAck)
            }
            (ReplyShape::Status | ReplyShape::Any, Reply::Status { status, clock }) => {
                self.model.apply_status(status, clock);
                self.finish_write(pin, command);
                Ok(())
            }
            (ReplyShape::Listing, Reply::Ack { echo }) => {
                let overview = frame::parse_overview(&echo)?;
                self.model.apply_overview(overview);
                Ok(())
            }
            (ReplyShape::Ack | ReplyShape::Any, Reply::Ack { .. }) => {
                self.finish_write(pin, command);
                Ok(())
            }
            (_, _) => Err(ProtocolError::UnexpectedReply { raw }),
        }
    }

    // Post-acknowledgment bookkeeping for write commands
    fn finish_write(&mut self, pin: &mut Pin, command: &Command) {
        if let Command::ChangePin { new_pin } = command {
            *pin = new_pin.clone();
        }
    }
}
