// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol definitions for KeyLink secure device communication
//!
//! This module provides the wire specification and reference encodings used between
//! a host and a KeyLink signing device, shared by the host library and the device engine.
//!
//! All messages share one fixed-size envelope ([frame]), carrying either a handshake
//! ([connect]) or an encrypted request ([encrypted]). Encrypted requests are keyed by
//! a shared secret that rotates on every exchange, see [crypto] for the primitives.
//!
//! Multi-byte integers on the wire are big-endian, and every frame and encrypted block
//! carries a CRC-32 checksum over all preceding bytes.
//!

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

pub mod connect;
pub mod crypto;
pub mod encrypted;
#[cfg(feature = "serde")]
pub mod envelope;
pub mod firmware;
pub mod frame;
pub mod pairing;
pub mod prelude;
pub mod status;
pub mod wallet;

mod helpers;

pub use status::ResponseCode;

/// Protocol version byte carried by every frame
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Frame header length (version, type, message id, payload length)
pub const HEADER_LEN: usize = 8;

/// Length of every checksum field
pub const CHECKSUM_LEN: usize = 4;

/// Length of a message identifier
pub const MSG_ID_LEN: usize = 4;

/// Length of a SEC1 uncompressed P-256 public key
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a shared secret / AES-256 key
pub const SHARED_SECRET_LEN: usize = 32;

/// Length of the ephemeral session identifier
pub const EPHEMERAL_ID_LEN: usize = 4;

/// Length of the encrypted block in both request and response directions
pub const ENCRYPTED_DATA_LEN: usize = 1728;

/// Cleartext space available for operation data in an encrypted request
/// (block less operation type and checksum)
pub const REQUEST_DATA_CAPACITY: usize = ENCRYPTED_DATA_LEN - 1 - CHECKSUM_LEN;

/// Cleartext space available for result data in an encrypted response
/// (block less next ephemeral key and checksum)
pub const RESPONSE_DATA_CAPACITY: usize = ENCRYPTED_DATA_LEN - PUBLIC_KEY_LEN - CHECKSUM_LEN;

/// Outer frame message types
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, TryFromPrimitive)]
#[repr(u8)]
pub enum MsgType {
    /// Response from the device
    Response = 0x00,
    /// Secure request from the host
    Secure = 0x02,
}

/// Secure request types, first byte of every request payload
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, TryFromPrimitive)]
#[repr(u8)]
pub enum SecureMsgType {
    /// Unencrypted handshake carrying the host identity key
    Connect = 0x01,
    /// Encrypted operation request
    Encrypted = 0x02,
}

/// Encrypted operation types
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RequestType {
    /// Complete pairing with a signature over the pairing salt and secret
    FinalizePairing = 0x00,
    /// Derive addresses / public keys
    GetAddresses = 0x01,
    /// Sign a request payload
    Sign = 0x03,
    /// Fetch active wallet descriptors
    GetWallets = 0x04,
    /// Fetch key-value records
    GetKvRecords = 0x07,
    /// Add key-value records
    AddKvRecords = 0x08,
    /// Remove key-value records
    RemoveKvRecords = 0x09,
    /// Fetch device-encrypted data
    FetchEncryptedData = 0x0c,
    /// Generic test hook
    Test = 0x0d,
}

impl RequestType {
    /// Fixed length of result data returned for this operation
    pub const fn response_len(&self) -> usize {
        match self {
            RequestType::FinalizePairing => 0,
            RequestType::GetAddresses => 1290,
            RequestType::Sign => 1090,
            RequestType::GetWallets => wallet::ACTIVE_WALLETS_LEN,
            RequestType::GetKvRecords => 1395,
            RequestType::AddKvRecords => 0,
            RequestType::RemoveKvRecords => 0,
            RequestType::FetchEncryptedData => 1608,
            RequestType::Test => 1646,
        }
    }

    /// Check whether this operation manipulates key-value records
    pub const fn is_kv(&self) -> bool {
        matches!(
            self,
            RequestType::GetKvRecords | RequestType::AddKvRecords | RequestType::RemoveKvRecords
        )
    }
}

/// Protocol encoding / decoding errors
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ProtoError {
    /// Buffer or frame length does not match the expected size
    #[error("invalid length (expected: {expected}, actual: {actual})")]
    InvalidLength { expected: usize, actual: usize },

    /// Protocol version mismatch
    #[error("unsupported protocol version {0:#04x}")]
    InvalidVersion(u8),

    /// Unexpected message type
    #[error("unexpected message type {0:#04x}")]
    InvalidMsgType(u8),

    /// Message identifier does not match the request
    #[error("message id mismatch (expected: {expected:08x}, actual: {actual:08x})")]
    MsgIdMismatch { expected: u32, actual: u32 },

    /// Checksum validation failed
    #[error("checksum mismatch (expected: {expected:08x}, actual: {actual:08x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid public key encoding
    #[error("invalid public key")]
    InvalidKey,

    /// Invalid signature encoding
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid firmware version encoding
    #[error("invalid firmware version length {0}")]
    InvalidFirmware(usize),

    /// Unknown operation or status value
    #[error("invalid encoding")]
    InvalidEncoding,
}

impl From<encdec::Error> for ProtoError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ProtoError::InvalidLength {
                expected: 0,
                actual: 0,
            },
            #[allow(unreachable_patterns)]
            _ => ProtoError::InvalidEncoding,
        }
    }
}

/// Helper to check a buffer is at least `n` bytes long
pub(crate) fn check_len(buff: &[u8], n: usize) -> Result<(), ProtoError> {
    if buff.len() < n {
        return Err(ProtoError::InvalidLength {
            expected: n,
            actual: buff.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use core::fmt::Debug;

    use encdec::{DecodeOwned, Encode};

    use super::*;

    /// Helper for encode / decode tests on fixed-size objects
    pub fn encode_decode<A>(buff: &mut [u8], v: &A, expected_len: usize)
    where
        A: Encode<Error = ProtoError>
            + DecodeOwned<Output = A, Error = ProtoError>
            + PartialEq
            + Debug,
    {
        // Check encoded length matches expected length
        let n = v.encode_len().expect("get length failed");
        assert_eq!(n, expected_len, "encode length mismatch");

        // Encode object
        let encoded_n = v.encode(buff).expect("encode failed");
        assert_eq!(n, encoded_n);

        // Decode object
        let (decoded, decoded_n) = A::decode_owned(&buff[..n]).expect("decode failed");

        // Check decoded object and length match
        assert_eq!(v, &decoded);
        assert_eq!(n, decoded_n);
    }

    #[test]
    fn request_types_fit_response_capacity() {
        use strum::IntoEnumIterator;

        for t in RequestType::iter() {
            assert!(
                t.response_len() <= RESPONSE_DATA_CAPACITY,
                "{t} response exceeds block capacity"
            );
        }
    }

    #[test]
    fn block_capacities() {
        assert_eq!(REQUEST_DATA_CAPACITY, 1723);
        assert_eq!(RESPONSE_DATA_CAPACITY, 1659);
        assert_eq!(ENCRYPTED_DATA_LEN % 16, 0);
    }
}
