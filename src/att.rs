//! Attribute Protocol ([Vol 3] Part F).

use std::fmt::{Display, Formatter};

pub use {client::*, consts::*, handle::*, pdu::*, perm::*, table::*};

use crate::host;

mod client;
mod consts;
mod handle;
mod pdu;
mod perm;
mod table;

/// Error type returned by the ATT layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("resource pool exhausted")]
    OutOfMemory,
    #[error("{0} already exists")]
    AlreadyExists(Handle),
    #[error("malformed PDU")]
    BadData,
    #[error("truncated PDU ({have} bytes, need {need})")]
    BadLength { have: usize, need: usize },
    #[error("message does not fit in the destination buffer")]
    MessageTooLarge,
    #[error("{0} is not connected")]
    NotConnected(host::ConnHandle),
    #[error(transparent)]
    Transport(#[from] host::Error),
    #[error(transparent)]
    Att(#[from] ErrorRsp),
}

/// Common ATT result type.
pub type Result<T> = std::result::Result<T, Error>;

/// `ATT_ERROR_RSP` PDU ([Vol 3] Part F, Section 3.4.1.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ErrorRsp {
    /// Raw opcode of the failed request.
    pub req: u8,
    pub hdl: Option<Handle>,
    pub err: ErrorCode,
}

impl Display for ErrorRsp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match Opcode::try_from(self.req) {
            Ok(op) => write!(f, "ATT {op} failed with {}", self.err)?,
            Err(_) => write!(f, "ATT {:#04X} failed with {}", self.req, self.err)?,
        }
        match self.hdl {
            Some(h) => write!(f, " for {h}"),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ErrorRsp {}

impl ErrorRsp {
    /// Creates an error response for request `req`.
    #[inline]
    #[must_use]
    pub fn new(req: impl Into<u8>, hdl: Option<Handle>, err: ErrorCode) -> Self {
        Self {
            req: req.into(),
            hdl,
            err,
        }
    }
}
