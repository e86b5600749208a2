// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cryptographic primitives for secure device sessions
//!
//! - Key agreement: P-256 ECDH producing a fixed-width 32-byte secret
//! - Symmetric: AES-256-CBC with a static IV (see [AES_IV])
//! - Integrity: CRC-32 checksums over cleartext / frame bytes
//! - Session lookup: a 4-byte ephemeral identifier derived from the shared secret

use aes::{
    cipher::{
        block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut,
        BlockEncryptMut, KeyIvInit,
    },
    Aes256,
};
use byteorder::{BigEndian, ByteOrder};
use p256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::{ProtoError, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};

/// Static AES initialisation vector used for every encrypted block.
///
/// Each block is encrypted under a different [SharedSecret], as the device
/// rotates its ephemeral key on every exchange, so key uniqueness provides the
/// semantic security a random IV would otherwise supply. The IV may only change
/// together with the key derivation contract, as it is fixed in device firmware.
pub const AES_IV: [u8; 16] = *b"mysecretpassword";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Maximum encoded length of a pairing signature (DER, zero padded)
pub const SIGNATURE_LEN: usize = 74;

/// CRC-32 (ISO-HDLC) instance for message checksums
const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Compute the 4-byte checksum over the provided bytes
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// P-256 keypair, used for host identity keys and device ephemeral keys
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        Self {
            secret: SecretKey::random(rng),
        }
    }

    /// Load a keypair from 32-byte big-endian private scalar
    pub fn from_bytes(b: &[u8]) -> Result<Self, ProtoError> {
        let secret = SecretKey::from_slice(b).map_err(|_| ProtoError::InvalidKey)?;
        Ok(Self { secret })
    }

    /// Fetch private scalar bytes
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut b = Zeroizing::new([0u8; 32]);
        b.copy_from_slice(&self.secret.to_bytes());
        b
    }

    /// Fetch the SEC1 uncompressed public key
    pub fn public_key(&self) -> PublicKey {
        let p = self.secret.public_key().to_encoded_point(false);

        let mut b = [0u8; PUBLIC_KEY_LEN];
        b.copy_from_slice(p.as_bytes());

        PublicKey(b)
    }

    /// Derive a shared secret with the provided peer public key
    pub fn shared_secret(&self, peer: &PublicKey) -> Result<SharedSecret, ProtoError> {
        let p = peer.to_point()?;

        let s = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), p.as_affine());

        // `raw_secret_bytes` is the fixed-width big-endian x coordinate, secrets
        // with leading zero bytes must keep their full 32-byte width for framing
        let mut b = [0u8; SHARED_SECRET_LEN];
        b.copy_from_slice(s.raw_secret_bytes().as_slice());

        Ok(SharedSecret(b))
    }

    /// Sign a message (ECDSA P-256 / SHA-256), returning a zero-padded DER signature
    pub fn sign(&self, msg: &[u8]) -> [u8; SIGNATURE_LEN] {
        let k = SigningKey::from(&self.secret);
        let sig: Signature = k.sign(msg);
        let der = sig.to_der();

        let mut b = [0u8; SIGNATURE_LEN];
        b[..der.as_bytes().len()].copy_from_slice(der.as_bytes());
        b
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// SEC1 uncompressed P-256 public key
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Fetch public key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    fn to_point(self) -> Result<p256::PublicKey, ProtoError> {
        p256::PublicKey::from_sec1_bytes(&self.0).map_err(|_| ProtoError::InvalidKey)
    }

    /// Verify a zero-padded DER signature produced by [KeyPair::sign]
    pub fn verify(&self, msg: &[u8], sig: &[u8; SIGNATURE_LEN]) -> Result<(), ProtoError> {
        // DER sequence length is encoded in the second byte
        let n = 2 + sig[1] as usize;
        if sig[0] != 0x30 || n > SIGNATURE_LEN {
            return Err(ProtoError::InvalidSignature);
        }

        let sig = Signature::from_der(&sig[..n]).map_err(|_| ProtoError::InvalidSignature)?;
        let k = VerifyingKey::from(&self.to_point()?);

        k.verify(msg, &sig).map_err(|_| ProtoError::InvalidSignature)
    }
}

/// Parse and validate a public key from SEC1 uncompressed bytes
impl TryFrom<&[u8]> for PublicKey {
    type Error = ProtoError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        if b.len() != PUBLIC_KEY_LEN {
            return Err(ProtoError::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                actual: b.len(),
            });
        }

        let mut k = [0u8; PUBLIC_KEY_LEN];
        k.copy_from_slice(b);

        // Check the point is on the curve
        let k = PublicKey(k);
        k.to_point()?;

        Ok(k)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Debug format [PublicKey] as hex
impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in &self.0[..] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Shared secret derived via [KeyPair::shared_secret], used as the AES-256 key
/// for a single exchange
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    /// Fetch secret bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }

    /// Compute the ephemeral session identifier for this secret
    /// (first 4 bytes of SHA-256(secret), big-endian)
    pub fn ephemeral_id(&self) -> u32 {
        let h = Sha256::digest(self.0);
        BigEndian::read_u32(&h[..4])
    }

    /// Encrypt a block-aligned buffer in place
    pub fn encrypt(&self, buff: &mut [u8]) -> Result<(), ProtoError> {
        check_blocks(buff)?;

        let n = buff.len();
        Aes256CbcEnc::new(GenericArray::from_slice(&self.0), &AES_IV.into())
            .encrypt_padded_mut::<NoPadding>(buff, n)
            .map_err(|_| invalid_blocks(n))?;

        Ok(())
    }

    /// Decrypt a block-aligned buffer in place
    pub fn decrypt(&self, buff: &mut [u8]) -> Result<(), ProtoError> {
        check_blocks(buff)?;

        let n = buff.len();
        Aes256CbcDec::new(GenericArray::from_slice(&self.0), &AES_IV.into())
            .decrypt_padded_mut::<NoPadding>(buff)
            .map_err(|_| invalid_blocks(n))?;

        Ok(())
    }
}

impl From<[u8; SHARED_SECRET_LEN]> for SharedSecret {
    fn from(b: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(b)
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SharedSecret(id: {:08x})", self.ephemeral_id())
    }
}

fn check_blocks(buff: &[u8]) -> Result<(), ProtoError> {
    if buff.len() % BLOCK_LEN != 0 {
        return Err(invalid_blocks(buff.len()));
    }
    Ok(())
}

fn invalid_blocks(actual: usize) -> ProtoError {
    ProtoError::InvalidLength {
        expected: (actual / BLOCK_LEN + 1) * BLOCK_LEN,
        actual,
    }
}
