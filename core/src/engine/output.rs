// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Encode;

use keylink_proto::{
    connect::{ConnectResp, CONNECT_RESP_LEN},
    frame::{encode_response, ENCRYPTED_RESP_LEN},
    ResponseCode, ENCRYPTED_DATA_LEN,
};

use super::Error;

/// [`Engine`][super::Engine] outputs (in response to events), encoded to response frames
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    /// Handshake response
    Connect(ConnectResp),

    /// Sealed encrypted response block
    Encrypted([u8; ENCRYPTED_DATA_LEN]),

    /// Failure response, zero padded to the fixed body length of the request kind
    Error { code: ResponseCode, body_len: usize },
}

impl Output {
    /// Create a failure output for a handshake request
    pub fn connect_error(code: ResponseCode) -> Self {
        Output::Error {
            code,
            body_len: CONNECT_RESP_LEN,
        }
    }

    /// Create a failure output for an encrypted request
    pub fn encrypted_error(code: ResponseCode) -> Self {
        Output::Error {
            code,
            body_len: ENCRYPTED_RESP_LEN,
        }
    }

    /// Fetch the response code for this output
    pub fn code(&self) -> ResponseCode {
        match self {
            Output::Error { code, .. } => *code,
            _ => ResponseCode::Success,
        }
    }

    /// Encode output to a response frame with the provided message identifier
    pub fn encode_frame(&self, msg_id: u32) -> Result<Vec<u8>, Error> {
        let r = match self {
            Output::Connect(c) => {
                let mut body = [0u8; CONNECT_RESP_LEN];
                c.encode(&mut body)?;

                encode_response(msg_id, ResponseCode::Success, &body, CONNECT_RESP_LEN)
            }
            Output::Encrypted(b) => {
                encode_response(msg_id, ResponseCode::Success, b, ENCRYPTED_RESP_LEN)
            }
            Output::Error { code, body_len } => encode_response(msg_id, *code, &[], *body_len),
        };

        r.map_err(|_| Error::EncodingFailed)
    }
}
