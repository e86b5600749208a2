// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Message framing, shared by all request and response kinds
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    VERSION    |   MSG_TYPE    |        MSG_ID (4 bytes) ...   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... MSG_ID                   |          PAYLOAD_LEN          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                      PAYLOAD (variable length)                /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  CHECKSUM (CRC-32, all prior bytes)           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Response payloads begin with a [ResponseCode] byte followed by a body whose
//! size is fixed by the request kind, devices zero-pad error responses so every
//! response to a given request kind has the same total length.

use encdec::{DecodeOwned, Encode};

use crate::{
    check_len,
    connect::CONNECT_RESP_LEN,
    crypto::checksum,
    helpers::be,
    status::ResponseCode,
    MsgType, ProtoError, CHECKSUM_LEN, ENCRYPTED_DATA_LEN, HEADER_LEN, PROTOCOL_VERSION,
};

/// Payload length of a handshake request (secure type + public key)
pub const CONNECT_REQ_PAYLOAD_LEN: usize = 1 + crate::PUBLIC_KEY_LEN;

/// Payload length of an encrypted request (secure type + ephemeral id + block)
pub const ENCRYPTED_REQ_PAYLOAD_LEN: usize = 1 + crate::EPHEMERAL_ID_LEN + ENCRYPTED_DATA_LEN;

/// Body length of an encrypted response
pub const ENCRYPTED_RESP_LEN: usize = ENCRYPTED_DATA_LEN;

/// Compute total frame length for a given payload length
pub const fn frame_len(payload_len: usize) -> usize {
    HEADER_LEN + payload_len + CHECKSUM_LEN
}

/// Compute total response frame length for a given body length
pub const fn response_len(body_len: usize) -> usize {
    frame_len(1 + body_len)
}

/// Total length of a handshake response frame
pub const CONNECT_RESP_FRAME_LEN: usize = response_len(CONNECT_RESP_LEN);

/// Total length of an encrypted response frame
pub const ENCRYPTED_RESP_FRAME_LEN: usize = response_len(ENCRYPTED_RESP_LEN);

/// Frame header
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Header {
    /// Protocol version
    pub version: u8,
    /// Raw message type (see [MsgType])
    pub msg_type: u8,
    /// Message identifier, chosen by the requester
    pub msg_id: u32,
    /// Payload length
    pub len: u16,
}

impl Header {
    /// Create a new header for the current protocol version
    pub fn new(msg_type: MsgType, msg_id: u32, len: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type as u8,
            msg_id,
            len,
        }
    }
}

impl Encode for Header {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, HEADER_LEN)?;

        buff[0] = self.version;
        buff[1] = self.msg_type;
        be::enc_u32(self.msg_id, &mut buff[2..])?;
        be::enc_u16(self.len, &mut buff[6..])?;

        Ok(HEADER_LEN)
    }
}

impl DecodeOwned for Header {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, HEADER_LEN)?;

        let (msg_id, _) = be::dec_u32(&buff[2..])?;
        let (len, _) = be::dec_u16(&buff[6..])?;

        Ok((
            Self {
                version: buff[0],
                msg_type: buff[1],
                msg_id,
                len,
            },
            HEADER_LEN,
        ))
    }
}

/// Encode a frame with the provided header fields and payload, appending the checksum
pub fn encode_frame(msg_type: MsgType, msg_id: u32, payload: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let len = u16::try_from(payload.len()).map_err(|_| ProtoError::InvalidLength {
        expected: u16::MAX as usize,
        actual: payload.len(),
    })?;

    let mut buff = vec![0u8; frame_len(payload.len())];

    let mut index = Header::new(msg_type, msg_id, len).encode(&mut buff)?;

    buff[index..][..payload.len()].copy_from_slice(payload);
    index += payload.len();

    let cs = checksum(&buff[..index]);
    index += be::enc_u32(cs, &mut buff[index..])?;

    debug_assert_eq!(index, buff.len());

    Ok(buff)
}

/// Encode a response frame, zero-padding the body to `body_len`
pub fn encode_response(
    msg_id: u32,
    code: ResponseCode,
    body: &[u8],
    body_len: usize,
) -> Result<Vec<u8>, ProtoError> {
    if body.len() > body_len {
        return Err(ProtoError::InvalidLength {
            expected: body_len,
            actual: body.len(),
        });
    }

    let mut payload = vec![0u8; 1 + body_len];
    payload[0] = code as u8;
    payload[1..][..body.len()].copy_from_slice(body);

    encode_frame(MsgType::Response, msg_id, &payload)
}

/// Decoded and validated frame
#[derive(Clone, PartialEq, Debug)]
pub struct Frame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

/// Decode and validate a frame.
///
/// Checks, in order: total length (when `expected_len` is provided) and header
/// consistency, checksum, protocol version, message type, and message identifier
/// (when `msg_id` is provided).
pub fn decode_frame(
    buff: &[u8],
    expected_len: Option<usize>,
    msg_type: MsgType,
    msg_id: Option<u32>,
) -> Result<Frame<'_>, ProtoError> {
    if let Some(n) = expected_len {
        if buff.len() != n {
            return Err(ProtoError::InvalidLength {
                expected: n,
                actual: buff.len(),
            });
        }
    }

    check_len(buff, frame_len(0))?;

    let (header, index) = Header::decode_owned(buff)?;

    // Payload length must account for the whole frame
    let n = frame_len(header.len as usize);
    if buff.len() != n {
        return Err(ProtoError::InvalidLength {
            expected: n,
            actual: buff.len(),
        });
    }

    let cs_index = buff.len() - CHECKSUM_LEN;
    let (actual, _) = be::dec_u32(&buff[cs_index..])?;
    let expected = checksum(&buff[..cs_index]);
    if actual != expected {
        return Err(ProtoError::ChecksumMismatch { expected, actual });
    }

    if header.version != PROTOCOL_VERSION {
        return Err(ProtoError::InvalidVersion(header.version));
    }

    if header.msg_type != msg_type as u8 {
        return Err(ProtoError::InvalidMsgType(header.msg_type));
    }

    if let Some(expected) = msg_id {
        if header.msg_id != expected {
            return Err(ProtoError::MsgIdMismatch {
                expected,
                actual: header.msg_id,
            });
        }
    }

    Ok(Frame {
        header,
        payload: &buff[index..cs_index],
    })
}

/// Decoded response frame, prior to interpretation of the response code
#[derive(Clone, PartialEq, Debug)]
pub struct Response<'a> {
    pub msg_id: u32,
    pub code: ResponseCode,
    pub body: &'a [u8],
}

/// Decode and validate a response frame with a fixed body length
pub fn decode_response(
    buff: &[u8],
    body_len: usize,
    msg_id: u32,
) -> Result<Response<'_>, ProtoError> {
    let f = decode_frame(
        buff,
        Some(response_len(body_len)),
        MsgType::Response,
        Some(msg_id),
    )?;

    Ok(Response {
        msg_id: f.header.msg_id,
        code: ResponseCode::from_byte(f.payload[0]),
        body: &f.payload[1..],
    })
}
