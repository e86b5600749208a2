// Copyright (c) 2022-2023 The MobileCoin Foundation

use keylink_proto::{ProtoError, ResponseCode};

/// [Engine][super::Engine] errors
///
/// These cover requests that cannot be answered with a response frame,
/// failures of well-formed requests are reported to the host via
/// [ResponseCode]s.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error {
    /// Request frame could not be decoded
    #[error("invalid request frame: {0}")]
    Proto(#[from] ProtoError),

    /// Unrecognised secure request type
    #[error("unsupported secure request type {0:#04x}")]
    UnsupportedRequest(u8),

    /// Response encoding failed
    #[error("response encoding failed")]
    EncodingFailed,
}

impl Error {
    /// Map engine errors to the closest device response code
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Error::Proto(_) | Error::UnsupportedRequest(_) => ResponseCode::InvalidMsg,
            Error::EncodingFailed => ResponseCode::InternalError,
        }
    }
}
