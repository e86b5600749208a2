// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Active wallet descriptors

use encdec::{DecodeOwned, Encode};

use crate::{
    check_len,
    helpers::{arr, be},
    ProtoError,
};

/// Wallet unique identifier length
pub const WALLET_UID_LEN: usize = 32;

/// Wallet name field length (zero padded)
pub const WALLET_NAME_LEN: usize = 36;

/// Encoded length of a single [Wallet]
pub const WALLET_LEN: usize = WALLET_UID_LEN + 4 + WALLET_NAME_LEN;

/// Encoded length of [ActiveWallets] (internal then external)
pub const ACTIVE_WALLETS_LEN: usize = 2 * WALLET_LEN;

/// Wallet descriptor, an all-zero `uid` indicates no wallet is present
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                          UID (32-byte)                        /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     CAPABILITIES (u32 BE)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                  NAME (36-byte, zero padded)                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Wallet {
    pub uid: [u8; WALLET_UID_LEN],
    pub capabilities: u32,
    pub name: [u8; WALLET_NAME_LEN],
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            uid: [0u8; WALLET_UID_LEN],
            capabilities: 0,
            name: [0u8; WALLET_NAME_LEN],
        }
    }
}

impl Wallet {
    /// Create a new wallet descriptor, names longer than
    /// [WALLET_NAME_LEN] are truncated
    pub fn new(uid: [u8; WALLET_UID_LEN], capabilities: u32, name: &str) -> Self {
        let mut n = [0u8; WALLET_NAME_LEN];
        let l = name.len().min(WALLET_NAME_LEN);
        n[..l].copy_from_slice(&name.as_bytes()[..l]);

        Self {
            uid,
            capabilities,
            name: n,
        }
    }

    /// Check whether this descriptor is empty (no wallet present)
    pub fn is_empty(&self) -> bool {
        self.uid.iter().all(|b| *b == 0)
    }

    /// Fetch wallet name with zero padding removed
    pub fn name(&self) -> String {
        let n = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(WALLET_NAME_LEN);
        String::from_utf8_lossy(&self.name[..n]).into_owned()
    }
}

impl Encode for Wallet {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(WALLET_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, WALLET_LEN)?;

        let mut index = 0;
        index += arr::enc(&self.uid, &mut buff[index..])?;
        index += be::enc_u32(self.capabilities, &mut buff[index..])?;
        index += arr::enc(&self.name, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for Wallet {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, WALLET_LEN)?;

        let mut index = 0;

        let (uid, n) = arr::dec(&buff[index..])?;
        index += n;

        let (capabilities, n) = be::dec_u32(&buff[index..])?;
        index += n;

        let (name, n) = arr::dec(&buff[index..])?;
        index += n;

        Ok((
            Self {
                uid,
                capabilities,
                name,
            },
            index,
        ))
    }
}

/// Active wallets reported by the device
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ActiveWallets {
    /// Device internal wallet
    pub internal: Wallet,
    /// External (card) wallet
    pub external: Wallet,
}

impl ActiveWallets {
    /// Fetch the wallet used for requests, preferring the external wallet when present
    pub fn active(&self) -> Option<&Wallet> {
        if !self.external.is_empty() {
            Some(&self.external)
        } else if !self.internal.is_empty() {
            Some(&self.internal)
        } else {
            None
        }
    }

    /// Encode to a fixed-size array
    pub fn to_bytes(&self) -> [u8; ACTIVE_WALLETS_LEN] {
        let mut b = [0u8; ACTIVE_WALLETS_LEN];
        let n = WALLET_LEN;

        // Buffer lengths are fixed so encoding is infallible
        let _ = self.internal.encode(&mut b[..n]);
        let _ = self.external.encode(&mut b[n..]);

        b
    }
}

impl Encode for ActiveWallets {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(ACTIVE_WALLETS_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        check_len(buff, ACTIVE_WALLETS_LEN)?;

        let mut index = 0;
        index += self.internal.encode(&mut buff[index..])?;
        index += self.external.encode(&mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for ActiveWallets {
    type Output = Self;
    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        check_len(buff, ACTIVE_WALLETS_LEN)?;

        let mut index = 0;

        let (internal, n) = Wallet::decode_owned(&buff[index..])?;
        index += n;

        let (external, n) = Wallet::decode_owned(&buff[index..])?;
        index += n;

        Ok((Self { internal, external }, index))
    }
}
