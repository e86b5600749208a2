// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Pairing messages
//!
//! Pairing binds a host identity key to the device. The device displays a
//! pairing secret, the host signs
//! `identity_pub || app_name (zero padded) || salt || secret` with its identity
//! key and submits the signature in a [RequestType::FinalizePairing] request.
//!
//! [RequestType::FinalizePairing]: crate::RequestType::FinalizePairing

use encdec::{DecodeOwned, Encode};

use crate::{
    check_len,
    connect::PAIRING_SALT_LEN,
    crypto::{KeyPair, PublicKey, SIGNATURE_LEN},
    helpers::arr,
    ProtoError,
};

/// Length of the zero-padded application name field
pub const APP_NAME_LEN: usize = 25;

/// Maximum application name length (leaving a terminating zero)
pub const APP_NAME_MAX: usize = APP_NAME_LEN - 1;

/// Encoded length of [FinalizePairingReq]
pub const FINALIZE_PAIRING_LEN: usize = APP_NAME_LEN + SIGNATURE_LEN;

/// Encode an application name to its zero padded form,
/// returning `None` if the name is too long
pub fn app_name_bytes(name: &str) -> Option<[u8; APP_NAME_LEN]> {
    if name.len() > APP_NAME_MAX {
        return None;
    }

    let mut b = [0u8; APP_NAME_LEN];
    b[..name.len()].copy_from_slice(name.as_bytes());
    Some(b)
}

/// Build the message signed during pairing
pub fn pairing_message(
    identity_pub: &PublicKey,
    app_name: &[u8; APP_NAME_LEN],
    salt: &[u8; PAIRING_SALT_LEN],
    secret: &[u8],
) -> Vec<u8> {
    let mut m = Vec::with_capacity(
        identity_pub.as_bytes().len() + APP_NAME_LEN + PAIRING_SALT_LEN + secret.len(),
    );

    m.extend_from_slice(identity_pub.as_bytes());
    m.extend_from_slice(app_name);
    m.extend_from_slice(salt);
    m.extend_from_slice(secret);

    m
}

/// Finalize pairing request data
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /              APP_NAME (25-byte, zero padded)                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /            SIGNATURE (74-byte DER, zero padded)               /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct FinalizePairingReq {
    pub app_name: [u8; APP_NAME_LEN],
    pub signature: [u8; SIGNATURE_LEN],
}

impl FinalizePairingReq {
    /// Sign a pairing request with the host identity key
    pub fn sign(
        identity: &KeyPair,
        app_name: [u8; APP_NAME_LEN],
        salt: &[u8; PAIRING_SALT_LEN],
        secret: &[u8],
    ) -> Self {
        let m = pairing_message(&identity.public_key(), &app_name, salt, secret);

        Self {
            app_name,
            signature: identity.sign(&m),
        }
    }

    /// Verify the pairing signature against the host identity key
    pub fn verify(
        &self,
        identity_pub: &PublicKey,
        salt: &[u8; PAIRING_SALT_LEN],
        secret: &[u8],
    ) -> Result<(), ProtoError> {
        let m = pairing_message(identity_pub, &self.app_name, salt, secret);
        identity_pub.verify(&m, &self.signature)
    }
}

impl Encode for FinalizePairingReq {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(FINALIZE_PAIRING_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, FINALIZE_PAIRING_LEN)?;

        let mut index = 0;
        index += arr::enc(&self.app_name, &mut buff[index..])?;
        index += arr::enc(&self.signature, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for FinalizePairingReq {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, FINALIZE_PAIRING_LEN)?;

        let mut index = 0;

        let (app_name, n) = arr::dec(&buff[index..])?;
        index += n;

        let (signature, n) = arr::dec(&buff[index..])?;
        index += n;

        Ok((
            Self {
                app_name,
                signature,
            },
            index,
        ))
    }
}
