//! Protocol errors

use thiserror::Error;

use crate::schedule::ScheduleError;

/// Errors that can occur while talking to the outlet
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected to the device")]
    NotConnected,

    #[error("no reply from the device within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("device rejected the request; double-check the PIN")]
    NegativeAck,

    #[error("unexpected reply from the device: {raw:?}")]
    UnexpectedReply { raw: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
