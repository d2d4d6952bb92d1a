//! Device command protocol
//!
//! Implements the BS-21 text request/response protocol over one persistent
//! serial-over-RFCOMM connection: frame encoding with credential suffixes,
//! reply classification, the connection session, and the sequential
//! command queue executor.

pub mod command;
mod error;
pub mod executor;
pub mod frame;
pub mod session;

pub use command::Command;
pub use error::ProtocolError;
pub use executor::{ExecutorState, QueueError, QueueExecutor, QueueSummary};
pub use frame::Reply;
pub use session::{Direction, Session, SessionConfig, TraceEntry, Transport};

/// Nominal baud rate for the RFCOMM tty. RFCOMM carries its own flow
/// control, so the rate only matters for real serial adapters.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default reply timeout in milliseconds. The outlet needs several seconds
/// for its first reply after a connect.
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
