// Copyright (c) 2022-2023 The MobileCoin Foundation

use keylink_proto::{ProtoError, RequestType, ResponseCode};
use tokio::time::error::Elapsed;

use crate::session::PairingStatus;

/// KeyLink API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport error
    #[error("Transport error: {0}")]
    Transport(anyhow::Error),

    /// Request timeout
    #[error("Timeout waiting for device response")]
    RequestTimeout,

    /// Response framing / encoding error
    #[error("Protocol error: {0}")]
    Proto(ProtoError),

    /// Response message id mismatch, the session must be resynchronised
    #[error("Response message id mismatch (expected: {expected:08x}, actual: {actual:08x})")]
    Resync { expected: u32, actual: u32 },

    /// Device returned a failure response code
    #[error("Device error: {} ({:#04x})", .0.message(), .0.as_byte())]
    Device(ResponseCode),

    /// Request data exceeds the firmware limit for this operation
    #[error("Request data too large ({len} bytes, max: {max})")]
    DataTooLarge { len: usize, max: usize },

    /// Operation not supported by the connected firmware
    #[error("Operation {0} unsupported by device firmware")]
    Unsupported(RequestType),

    /// Invalid application name
    #[error("Invalid application name (maximum 24 bytes)")]
    InvalidAppName,

    /// No device ephemeral key available, connect before issuing requests
    #[error("Not connected, connect to the device before issuing requests")]
    MustReconnect,

    /// Invalid pairing state for this operation
    #[error("Invalid pairing state (actual: {actual}, expected: {expected})")]
    InvalidState {
        actual: PairingStatus,
        expected: PairingStatus,
    },

    /// Session encoding or consistency error
    #[error("Session error: {0}")]
    Session(String),

    /// Session store error
    #[error("Session store error: {0}")]
    Store(anyhow::Error),
}

impl Error {
    /// Fetch the device response code for this error, if any
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Error::Device(c) => Some(*c),
            _ => None,
        }
    }
}

impl From<ProtoError> for Error {
    fn from(e: ProtoError) -> Self {
        match e {
            ProtoError::MsgIdMismatch { expected, actual } => Error::Resync { expected, actual },
            _ => Error::Proto(e),
        }
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}

impl From<ResponseCode> for Error {
    fn from(c: ResponseCode) -> Self {
        Error::Device(c)
    }
}
