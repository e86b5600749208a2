// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session state and persistence
//!
//! A [SessionState] holds everything required to resume communication with a
//! paired device, and serialises to an opaque JSON blob (with hex-encoded byte
//! fields) for storage via a [SessionStore].

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use encdec::DecodeOwned;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use zeroize::Zeroizing;

use keylink_proto::{
    connect::{FW_VERSION_LEN, PAIRING_SALT_LEN},
    crypto::{KeyPair, PublicKey, SharedSecret},
    firmware::{FwCapabilities, FwVersion},
    wallet::ActiveWallets,
};

use crate::Error;

/// Host pairing status for a device
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, Serialize, Deserialize)]
pub enum PairingStatus {
    /// No handshake has reported a pairing state
    Unpaired,
    /// Device reported unpaired, awaiting [pair][crate::DeviceHandle::pair]
    PairingPending,
    /// Host identity is paired with the device
    Paired,
}

/// Session state for a single device
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord", into = "SessionRecord")]
pub struct SessionState {
    device_id: Option<String>,
    identity: KeyPair,
    peer_key: Option<PublicKey>,
    shared_secret: Option<SharedSecret>,
    fw_version: Option<[u8; FW_VERSION_LEN]>,
    capabilities: FwCapabilities,
    pairing_status: PairingStatus,
    pairing_salt: Option<[u8; PAIRING_SALT_LEN]>,
    active_wallets: ActiveWallets,
}

impl SessionState {
    /// Create a new empty session with the provided identity key
    pub fn new(identity: KeyPair) -> Self {
        Self {
            device_id: None,
            identity,
            peer_key: None,
            shared_secret: None,
            fw_version: None,
            capabilities: FwCapabilities::default(),
            pairing_status: PairingStatus::Unpaired,
            pairing_salt: None,
            active_wallets: ActiveWallets::default(),
        }
    }

    /// Create a new empty session with a random identity key
    pub fn random() -> Self {
        Self::new(KeyPair::random(&mut OsRng))
    }

    /// Device this session is bound to
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Host identity public key
    pub fn identity_public(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub(crate) fn identity(&self) -> &KeyPair {
        &self.identity
    }

    /// Current device ephemeral public key
    pub fn peer_key(&self) -> Option<&PublicKey> {
        self.peer_key.as_ref()
    }

    /// Current shared secret, failing with [Error::MustReconnect] where no
    /// handshake has completed
    pub fn shared_secret(&self) -> Result<&SharedSecret, Error> {
        self.shared_secret.as_ref().ok_or(Error::MustReconnect)
    }

    /// Ephemeral identifier for the current shared secret
    pub fn ephemeral_id(&self) -> Option<u32> {
        self.shared_secret.as_ref().map(|s| s.ephemeral_id())
    }

    /// Raw firmware version (`[fix, minor, major, reserved]`)
    pub fn fw_version(&self) -> Option<[u8; FW_VERSION_LEN]> {
        self.fw_version
    }

    /// Parsed firmware version, `None` for legacy firmware or before connecting
    pub fn firmware(&self) -> Option<FwVersion> {
        self.fw_version
            .and_then(|v| FwVersion::parse(&v[..3]).ok().flatten())
    }

    /// Firmware capabilities
    pub fn capabilities(&self) -> &FwCapabilities {
        &self.capabilities
    }

    pub fn pairing_status(&self) -> PairingStatus {
        self.pairing_status
    }

    pub fn pairing_salt(&self) -> Option<&[u8; PAIRING_SALT_LEN]> {
        self.pairing_salt.as_ref()
    }

    pub fn active_wallets(&self) -> &ActiveWallets {
        &self.active_wallets
    }

    /// Compute the shared secret for a new peer key without updating the session
    pub(crate) fn derive_secret(&self, peer: &PublicKey) -> Result<SharedSecret, Error> {
        Ok(self.identity.shared_secret(peer)?)
    }

    /// Replace the peer key and shared secret together
    pub(crate) fn set_peer(&mut self, peer: PublicKey, secret: SharedSecret) {
        self.peer_key = Some(peer);
        self.shared_secret = Some(secret);
    }

    /// Apply a completed handshake
    pub(crate) fn set_connected(
        &mut self,
        device_id: &str,
        fw_version: [u8; FW_VERSION_LEN],
        capabilities: FwCapabilities,
    ) {
        self.device_id = Some(device_id.to_string());
        self.fw_version = Some(fw_version);
        self.capabilities = capabilities;
    }

    pub(crate) fn set_paired(&mut self, wallets: Option<ActiveWallets>) {
        self.pairing_status = PairingStatus::Paired;
        self.pairing_salt = None;
        if let Some(w) = wallets {
            self.active_wallets = w;
        }
    }

    pub(crate) fn set_pairing_pending(&mut self, salt: [u8; PAIRING_SALT_LEN]) {
        self.pairing_status = PairingStatus::PairingPending;
        self.pairing_salt = Some(salt);
    }

    pub(crate) fn set_active_wallets(&mut self, wallets: ActiveWallets) {
        self.active_wallets = wallets;
    }

    /// Encode session to a JSON blob
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Session(e.to_string()))
    }

    /// Decode session from a JSON blob
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|e| Error::Session(e.to_string()))
    }
}

/// Serialised session encoding
#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionRecord {
    device_id: Option<String>,
    identity_key: String,
    peer_public_key: Option<String>,
    shared_secret: Option<String>,
    firmware_version: Option<String>,
    pairing_status: PairingStatus,
    pairing_salt: Option<String>,
    active_wallets: String,
}

impl From<SessionState> for SessionRecord {
    fn from(s: SessionState) -> Self {
        Self {
            device_id: s.device_id,
            identity_key: hex::encode(&s.identity.to_bytes()[..]),
            peer_public_key: s.peer_key.map(hex::encode),
            shared_secret: s.shared_secret.as_ref().map(|v| hex::encode(v.as_bytes())),
            firmware_version: s.fw_version.map(hex::encode),
            pairing_status: s.pairing_status,
            pairing_salt: s.pairing_salt.map(hex::encode),
            active_wallets: hex::encode(s.active_wallets.to_bytes()),
        }
    }
}

impl TryFrom<SessionRecord> for SessionState {
    type Error = Error;

    fn try_from(r: SessionRecord) -> Result<Self, Self::Error> {
        let identity = Zeroizing::new(decode_hex(&r.identity_key, "identity_key")?);
        let identity = KeyPair::from_bytes(&identity)?;

        let fw_version = r
            .firmware_version
            .map(|v| decode_array::<FW_VERSION_LEN>(&v, "firmware_version"))
            .transpose()?;

        // Capabilities are always re-derived from the stored version
        let capabilities = match fw_version {
            Some(v) => FwCapabilities::resolve(&v[..3])?,
            None => FwCapabilities::default(),
        };

        let pairing_salt = r
            .pairing_salt
            .map(|v| decode_array::<PAIRING_SALT_LEN>(&v, "pairing_salt"))
            .transpose()?;

        let wallets = decode_hex(&r.active_wallets, "active_wallets")?;
        let (active_wallets, _) = ActiveWallets::decode_owned(&wallets)?;

        let mut s = Self {
            device_id: r.device_id,
            identity,
            peer_key: None,
            shared_secret: None,
            fw_version,
            capabilities,
            pairing_status: r.pairing_status,
            pairing_salt,
            active_wallets,
        };

        // Recompute the shared secret from the peer key and check it matches
        match (r.peer_public_key, r.shared_secret) {
            (Some(p), Some(stored)) => {
                let peer = PublicKey::try_from(&decode_hex(&p, "peer_public_key")?[..])?;
                let secret = s.derive_secret(&peer)?;

                let stored = Zeroizing::new(decode_hex(&stored, "shared_secret")?);
                if secret.as_bytes()[..] != stored[..] {
                    return Err(Error::Session("shared secret mismatch".to_string()));
                }

                s.set_peer(peer, secret);
            }
            (None, None) => (),
            _ => {
                return Err(Error::Session(
                    "peer key and shared secret must be set together".to_string(),
                ))
            }
        }

        Ok(s)
    }
}

fn decode_hex(v: &str, field: &str) -> Result<Vec<u8>, Error> {
    hex::decode(v).map_err(|e| Error::Session(format!("invalid {field}: {e}")))
}

fn decode_array<const N: usize>(v: &str, field: &str) -> Result<[u8; N], Error> {
    let d = decode_hex(v, field)?;
    d.try_into()
        .map_err(|_| Error::Session(format!("invalid {field} length")))
}

/// Storage for serialised sessions
pub trait SessionStore: Send + Sync {
    /// Load a stored session blob, if one exists
    fn load(&self) -> anyhow::Result<Option<String>>;

    /// Store a session blob
    fn save(&self, blob: &str) -> anyhow::Result<()>;
}

/// In-memory [SessionStore], clones share the stored blob
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        let b = self
            .blob
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(b.clone())
    }

    fn save(&self, blob: &str) -> anyhow::Result<()> {
        let mut b = self
            .blob
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        *b = Some(blob.to_string());
        Ok(())
    }
}

/// File-backed [SessionStore]
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> anyhow::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let s = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading session from {}", self.path.display()))?;
        Ok(Some(s))
    }

    fn save(&self, blob: &str) -> anyhow::Result<()> {
        // Write to a temporary file and rename to avoid partial sessions
        let tmp = self.path.with_extension("tmp");

        std::fs::write(&tmp, blob)
            .with_context(|| format!("writing session to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing session at {}", self.path.display()))?;

        Ok(())
    }
}
