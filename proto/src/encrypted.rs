// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Encrypted request and response blocks
//!
//! Requests carry the operation type and zero-padded operation data, responses
//! carry the next device ephemeral key and zero-padded result data. Both are
//! checksummed in cleartext then encrypted as a single [ENCRYPTED_DATA_LEN] block.
//!
//! ## Request cleartext
//! ```text
//! +---------+-----------------------------+--------------+
//! | OP (1)  | DATA (1723, zero padded)    | CRC-32 (4)   |
//! +---------+-----------------------------+--------------+
//! ```
//!
//! ## Response cleartext
//! ```text
//! +-------------------+-----------------------+--------------+
//! | NEXT_PUB_KEY (65) | RESULT (1659, padded) | CRC-32 (4)   |
//! +-------------------+-----------------------+--------------+
//! ```

use encdec::{DecodeOwned, Encode};

use crate::{
    check_len,
    crypto::{checksum, PublicKey, SharedSecret},
    helpers::{arr, be},
    ProtoError, RequestType, SecureMsgType, CHECKSUM_LEN, ENCRYPTED_DATA_LEN, EPHEMERAL_ID_LEN,
    PUBLIC_KEY_LEN, REQUEST_DATA_CAPACITY, RESPONSE_DATA_CAPACITY,
};

/// Encrypted request payload
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SECURE_TYPE  |          EPHEMERAL_ID (u32 BE) ...            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  ... EPHEM_ID |                                               |
/// +-+-+-+-+-+-+-+-+                                               +
/// /                   ENCRYPTED_BLOCK (1728-byte)                 /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct EncryptedReq {
    /// Identifier of the shared secret used to encrypt `block`
    pub ephemeral_id: u32,
    /// Encrypted request block
    pub block: [u8; ENCRYPTED_DATA_LEN],
}

/// Encoded length of an [EncryptedReq] payload
pub const ENCRYPTED_REQ_LEN: usize = 1 + EPHEMERAL_ID_LEN + ENCRYPTED_DATA_LEN;

impl EncryptedReq {
    /// Seal an operation request under the provided shared secret
    pub fn seal(secret: &SharedSecret, op: RequestType, data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() > REQUEST_DATA_CAPACITY {
            return Err(ProtoError::InvalidLength {
                expected: REQUEST_DATA_CAPACITY,
                actual: data.len(),
            });
        }

        let mut block = [0u8; ENCRYPTED_DATA_LEN];
        block[0] = op as u8;
        block[1..][..data.len()].copy_from_slice(data);

        let cs_index = ENCRYPTED_DATA_LEN - CHECKSUM_LEN;
        let cs = checksum(&block[..cs_index]);
        be::enc_u32(cs, &mut block[cs_index..])?;

        secret.encrypt(&mut block)?;

        Ok(Self {
            ephemeral_id: secret.ephemeral_id(),
            block,
        })
    }

    /// Open an encrypted request, returning the raw operation byte
    /// and zero-padded operation data
    pub fn open(&self, secret: &SharedSecret) -> Result<(u8, Vec<u8>), ProtoError> {
        let mut block = self.block;
        secret.decrypt(&mut block)?;

        let body = verify_block(&block)?;

        Ok((body[0], body[1..].to_vec()))
    }
}

impl Encode for EncryptedReq {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(ENCRYPTED_REQ_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, ENCRYPTED_REQ_LEN)?;

        let mut index = 0;

        buff[index] = SecureMsgType::Encrypted as u8;
        index += 1;

        index += be::enc_u32(self.ephemeral_id, &mut buff[index..])?;
        index += arr::enc(&self.block, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for EncryptedReq {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, ENCRYPTED_REQ_LEN)?;

        if buff[0] != SecureMsgType::Encrypted as u8 {
            return Err(ProtoError::InvalidMsgType(buff[0]));
        }

        let mut index = 1;

        let (ephemeral_id, n) = be::dec_u32(&buff[index..])?;
        index += n;

        let (block, n) = arr::dec(&buff[index..])?;
        index += n;

        Ok((
            Self {
                ephemeral_id,
                block,
            },
            index,
        ))
    }
}

/// Decrypted response block
#[derive(Clone, PartialEq, Debug)]
pub struct EncryptedResp {
    /// Next device ephemeral public key
    pub next_pub: PublicKey,
    /// Result data, zero-padded to [RESPONSE_DATA_CAPACITY]
    pub data: Vec<u8>,
}

impl EncryptedResp {
    /// Seal a response block, committing to the next device ephemeral key
    pub fn seal(
        secret: &SharedSecret,
        next_pub: &PublicKey,
        data: &[u8],
    ) -> Result<[u8; ENCRYPTED_DATA_LEN], ProtoError> {
        if data.len() > RESPONSE_DATA_CAPACITY {
            return Err(ProtoError::InvalidLength {
                expected: RESPONSE_DATA_CAPACITY,
                actual: data.len(),
            });
        }

        let mut block = [0u8; ENCRYPTED_DATA_LEN];
        block[..PUBLIC_KEY_LEN].copy_from_slice(next_pub.as_bytes());
        block[PUBLIC_KEY_LEN..][..data.len()].copy_from_slice(data);

        let cs_index = ENCRYPTED_DATA_LEN - CHECKSUM_LEN;
        let cs = checksum(&block[..cs_index]);
        be::enc_u32(cs, &mut block[cs_index..])?;

        secret.encrypt(&mut block)?;

        Ok(block)
    }

    /// Open an encrypted response block, verifying the cleartext checksum
    pub fn open(secret: &SharedSecret, encrypted: &[u8]) -> Result<Self, ProtoError> {
        if encrypted.len() != ENCRYPTED_DATA_LEN {
            return Err(ProtoError::InvalidLength {
                expected: ENCRYPTED_DATA_LEN,
                actual: encrypted.len(),
            });
        }

        let mut block = [0u8; ENCRYPTED_DATA_LEN];
        block.copy_from_slice(encrypted);
        secret.decrypt(&mut block)?;

        let body = verify_block(&block)?;

        let next_pub = PublicKey::try_from(&body[..PUBLIC_KEY_LEN])?;

        Ok(Self {
            next_pub,
            data: body[PUBLIC_KEY_LEN..].to_vec(),
        })
    }

    /// Fetch result data trimmed to the fixed response length of `op`
    pub fn result(&self, op: RequestType) -> &[u8] {
        &self.data[..op.response_len().min(self.data.len())]
    }
}

/// Check the trailing checksum of a decrypted block, returning the checksummed body
fn verify_block(block: &[u8; ENCRYPTED_DATA_LEN]) -> Result<&[u8], ProtoError> {
    let cs_index = ENCRYPTED_DATA_LEN - CHECKSUM_LEN;

    let (actual, _) = be::dec_u32(&block[cs_index..])?;
    let expected = checksum(&block[..cs_index]);

    if actual != expected {
        return Err(ProtoError::ChecksumMismatch { expected, actual });
    }

    Ok(&block[..cs_index])
}
