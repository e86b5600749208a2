// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handshake (connect) messages

use encdec::{DecodeOwned, Encode};
use num_enum::TryFromPrimitive;
use strum::Display;

use crate::{
    check_len,
    crypto::{PublicKey, SharedSecret},
    helpers::arr,
    wallet::{ActiveWallets, ACTIVE_WALLETS_LEN},
    ProtoError, SecureMsgType, PUBLIC_KEY_LEN,
};

/// Length of the firmware version field `[fix, minor, major, reserved]`
pub const FW_VERSION_LEN: usize = 4;

/// Length of the pairing salt issued to unpaired hosts
pub const PAIRING_SALT_LEN: usize = 32;

/// Length of the trailing wallet / salt field
pub const CONNECT_TAIL_LEN: usize = ACTIVE_WALLETS_LEN;

/// Handshake response body length
pub const CONNECT_RESP_LEN: usize = 1 + PUBLIC_KEY_LEN + FW_VERSION_LEN + CONNECT_TAIL_LEN;

/// Device-reported pairing state for the connecting host
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, TryFromPrimitive)]
#[repr(u8)]
pub enum DevicePairing {
    NotPaired = 0x00,
    Paired = 0x01,
}

/// Handshake request payload, sent unencrypted.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SECURE_TYPE  |                                               |
/// +-+-+-+-+-+-+-+-+                                               +
/// /               IDENTITY_PUBLIC_KEY (65-byte SEC1)              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ConnectReq {
    /// Host identity public key
    pub public_key: PublicKey,
}

impl ConnectReq {
    /// Create a new [ConnectReq]
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }
}

impl Encode for ConnectReq {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + PUBLIC_KEY_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, 1 + PUBLIC_KEY_LEN)?;

        buff[0] = SecureMsgType::Connect as u8;
        let n = arr::enc(self.public_key.as_bytes(), &mut buff[1..])?;

        Ok(1 + n)
    }
}

impl DecodeOwned for ConnectReq {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, 1 + PUBLIC_KEY_LEN)?;

        if buff[0] != SecureMsgType::Connect as u8 {
            return Err(ProtoError::InvalidMsgType(buff[0]));
        }

        let public_key = PublicKey::try_from(&buff[1..][..PUBLIC_KEY_LEN])?;

        Ok((Self { public_key }, 1 + PUBLIC_KEY_LEN))
    }
}

/// Handshake response body.
///
/// When the host is already paired `tail` contains the active wallet descriptors
/// encrypted under the secret derived from `ephemeral_pub`, otherwise it begins
/// with a one-time pairing salt.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    PAIRED     |                                               |
/// +-+-+-+-+-+-+-+-+                                               +
/// /              EPHEMERAL_PUBLIC_KEY (65-byte SEC1)              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      FIX      |     MINOR     |     MAJOR     |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /            WALLETS (encrypted) or PAIRING_SALT (144)          /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct ConnectResp {
    pub pairing: DevicePairing,
    pub ephemeral_pub: PublicKey,
    pub fw_version: [u8; FW_VERSION_LEN],
    pub tail: [u8; CONNECT_TAIL_LEN],
}

impl ConnectResp {
    /// Build a response for a paired host, encrypting wallet data under `secret`
    pub fn paired(
        ephemeral_pub: PublicKey,
        fw_version: [u8; FW_VERSION_LEN],
        wallets: &ActiveWallets,
        secret: &SharedSecret,
    ) -> Result<Self, ProtoError> {
        let mut tail = [0u8; CONNECT_TAIL_LEN];
        wallets.encode(&mut tail)?;
        secret.encrypt(&mut tail)?;

        Ok(Self {
            pairing: DevicePairing::Paired,
            ephemeral_pub,
            fw_version,
            tail,
        })
    }

    /// Build a response for an unpaired host carrying a pairing salt
    pub fn unpaired(
        ephemeral_pub: PublicKey,
        fw_version: [u8; FW_VERSION_LEN],
        salt: [u8; PAIRING_SALT_LEN],
    ) -> Self {
        let mut tail = [0u8; CONNECT_TAIL_LEN];
        tail[..PAIRING_SALT_LEN].copy_from_slice(&salt);

        Self {
            pairing: DevicePairing::NotPaired,
            ephemeral_pub,
            fw_version,
            tail,
        }
    }

    /// Fetch the pairing salt (unpaired responses only)
    pub fn salt(&self) -> Option<[u8; PAIRING_SALT_LEN]> {
        match self.pairing {
            DevicePairing::NotPaired => {
                let mut s = [0u8; PAIRING_SALT_LEN];
                s.copy_from_slice(&self.tail[..PAIRING_SALT_LEN]);
                Some(s)
            }
            DevicePairing::Paired => None,
        }
    }

    /// Decrypt active wallets (paired responses only) using the secret derived
    /// from `ephemeral_pub`
    pub fn wallets(&self, secret: &SharedSecret) -> Result<Option<ActiveWallets>, ProtoError> {
        if self.pairing != DevicePairing::Paired {
            return Ok(None);
        }

        let mut tail = self.tail;
        secret.decrypt(&mut tail)?;

        let (w, _) = ActiveWallets::decode_owned(&tail)?;
        Ok(Some(w))
    }
}

impl Encode for ConnectResp {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(CONNECT_RESP_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, CONNECT_RESP_LEN)?;

        let mut index = 0;

        buff[index] = self.pairing as u8;
        index += 1;

        index += arr::enc(self.ephemeral_pub.as_bytes(), &mut buff[index..])?;
        index += arr::enc(&self.fw_version, &mut buff[index..])?;
        index += arr::enc(&self.tail, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for ConnectResp {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, CONNECT_RESP_LEN)?;

        let mut index = 0;

        let pairing =
            DevicePairing::try_from(buff[index]).map_err(|_| ProtoError::InvalidEncoding)?;
        index += 1;

        let ephemeral_pub = PublicKey::try_from(&buff[index..][..PUBLIC_KEY_LEN])?;
        index += PUBLIC_KEY_LEN;

        let (fw_version, n) = arr::dec(&buff[index..])?;
        index += n;

        let (tail, n) = arr::dec(&buff[index..])?;
        index += n;

        Ok((
            Self {
                pairing,
                ephemeral_pub,
                fw_version,
                tail,
            },
            index,
        ))
    }
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::{crypto::KeyPair, test::encode_decode, wallet::Wallet};

    #[test]
    fn connect_req() {
        let k = KeyPair::random(&mut OsRng);
        let req = ConnectReq::new(k.public_key());

        let mut buff = [0u8; 128];
        encode_decode(&mut buff, &req, 66);
        assert_eq!(buff[0], SecureMsgType::Connect as u8);
    }

    #[test]
    fn connect_resp_unpaired() {
        let k = KeyPair::random(&mut OsRng);
        let resp = ConnectResp::unpaired(k.public_key(), [4, 10, 0, 0], [0x5a; 32]);

        let mut buff = [0u8; 256];
        encode_decode(&mut buff, &resp, CONNECT_RESP_LEN);

        assert_eq!(resp.salt(), Some([0x5a; 32]));
        assert_eq!(CONNECT_RESP_LEN, 214);
    }

    #[test]
    fn connect_resp_paired_wallets() {
        let (host, device) = (KeyPair::random(&mut OsRng), KeyPair::random(&mut OsRng));
        let secret = device.shared_secret(&host.public_key()).unwrap();

        let wallets = ActiveWallets {
            internal: Wallet::new([0x11; 32], 0x01, "internal"),
            external: Wallet::default(),
        };

        let resp =
            ConnectResp::paired(device.public_key(), [0, 15, 0, 0], &wallets, &secret).unwrap();
        assert_eq!(resp.salt(), None);

        // Host derives the same secret from the device ephemeral key
        let host_secret = host.shared_secret(&resp.ephemeral_pub).unwrap();
        assert_eq!(resp.wallets(&host_secret).unwrap(), Some(wallets));
    }
}
