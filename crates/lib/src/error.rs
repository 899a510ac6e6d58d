use std::io;
use std::sync::Arc;

use crate::job::JobKey;
use crate::session::{Mode, Operation};

/// Errors from an LPD session
///
/// Cloneable, with I/O errors shared behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LpdError {
    #[error("connection error: {0}")]
    Connection(#[source] Arc<io::Error>),

    #[error("{operation} is not allowed in {mode} mode")]
    WrongMode { operation: Operation, mode: Mode },

    #[error("no such job: {0}")]
    NoSuchJob(JobKey),

    #[error("control file for {0} has already been sent")]
    ControlFileAlreadySent(JobKey),

    #[error(
        "transfer would exceed its declared size: {declared} declared, {sent} sent, {attempted} more offered"
    )]
    OversizedTransfer {
        declared: u64,
        sent: u64,
        attempted: u64,
    },

    #[error("a declared size cannot be given while a data transfer is in progress")]
    UnexpectedArgument,

    #[error("daemon rejected {command} (code {code})")]
    ProtocolNack { command: String, code: u8 },

    #[error("data transfer for {0} is still in progress")]
    TransferInProgress(JobKey),

    #[error("job id {0} is out of range (0-999)")]
    InvalidJobId(u16),

    #[error("invalid name {0:?}: must be non-empty, without whitespace or control characters")]
    InvalidName(String),
}

impl From<io::Error> for LpdError {
    fn from(e: io::Error) -> Self {
        LpdError::Connection(Arc::new(e))
    }
}

pub type Result<T, E = LpdError> = std::result::Result<T, E>;
