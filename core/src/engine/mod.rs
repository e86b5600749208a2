// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] provides the device side of the KeyLink secure channel.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! see [proto][crate::proto] for protocol / encoding specifications.

use std::collections::{HashMap, VecDeque};

use encdec::DecodeOwned;
use rand_core::{CryptoRngCore, OsRng};
use sha2::{Digest, Sha256};
use strum::Display;

use keylink_proto::{
    connect::{ConnectResp, FW_VERSION_LEN, PAIRING_SALT_LEN},
    crypto::{KeyPair, PublicKey, SharedSecret},
    encrypted::{EncryptedReq, EncryptedResp},
    pairing::{FinalizePairingReq, APP_NAME_LEN},
    wallet::ActiveWallets,
    RequestType, ResponseCode, PUBLIC_KEY_LEN,
};

mod event;
pub use event::Event;

mod output;
pub use output::Output;

mod error;
pub use error::Error;

/// Injected device behaviour, consumed one per encrypted request
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Fault {
    /// Respond with the provided code without executing the request
    Status(ResponseCode),
    /// Execute the request but respond with a mismatched message identifier
    MsgIdMismatch,
    /// Discard all host sessions before handling the request
    ForgetSessions,
}

/// [`Driver`] trait provides platform support for [`Engine`] instances
pub trait Driver {
    /// Firmware version reported in handshake responses (`[fix, minor, major, reserved]`)
    fn fw_version(&self) -> [u8; FW_VERSION_LEN];

    /// Pairing secret displayed to the user during pairing
    fn pairing_secret(&self) -> &[u8];

    /// Deterministic derivation of device secrets for the provided context
    fn derive(&self, info: &[u8]) -> [u8; 32];
}

impl<T: Driver> Driver for &T {
    fn fw_version(&self) -> [u8; FW_VERSION_LEN] {
        T::fw_version(self)
    }

    fn pairing_secret(&self) -> &[u8] {
        T::pairing_secret(self)
    }

    fn derive(&self, info: &[u8]) -> [u8; 32] {
        T::derive(self, info)
    }
}

/// Per-host session state
struct Client {
    identity: PublicKey,
    /// Current device ephemeral keypair for this host
    ephemeral: KeyPair,
    /// Ephemeral identifier for the current shared secret
    session_id: u32,
    /// Pairing salt, issued to unpaired hosts on connect
    salt: Option<[u8; PAIRING_SALT_LEN]>,
    app_name: Option<[u8; APP_NAME_LEN]>,
}

impl Client {
    fn paired(&self) -> bool {
        self.app_name.is_some()
    }
}

/// [Engine] provides hardware-independent support for KeyLink device sessions
pub struct Engine<DRV: Driver, RNG: CryptoRngCore = OsRng> {
    clients: HashMap<[u8; PUBLIC_KEY_LEN], Client>,
    sessions: HashMap<u32, [u8; PUBLIC_KEY_LEN]>,

    wallets: ActiveWallets,

    locked: bool,
    pairing_enabled: bool,

    faults: VecDeque<Fault>,

    drv: DRV,
    rng: RNG,
}

impl<DRV: Driver> Engine<DRV> {
    /// Create a new engine instance with the provided driver,
    /// using the default [OsRng]
    pub fn new(drv: DRV) -> Self {
        Self::new_with_rng(drv, OsRng {})
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Engine<DRV, RNG> {
    /// Create a new engine instance with the provided driver and rng
    pub fn new_with_rng(drv: DRV, rng: RNG) -> Self {
        Self {
            clients: HashMap::new(),
            sessions: HashMap::new(),
            wallets: ActiveWallets::default(),
            locked: false,
            pairing_enabled: true,
            faults: VecDeque::new(),
            drv,
            rng,
        }
    }

    /// Handle a request frame, returning the encoded response frame
    pub fn handle(&mut self, frame: &[u8]) -> Result<Vec<u8>, Error> {
        let evt = Event::parse(frame)?;
        let fault = self.next_fault(&evt);

        let r = self.apply(&evt, fault)?;

        let msg_id = match fault {
            Some(Fault::MsgIdMismatch) => evt.msg_id().wrapping_add(1),
            _ => evt.msg_id(),
        };

        #[cfg(feature = "log")]
        log::debug!("response: {} (msg_id: {:08x})", r.code(), msg_id);

        r.encode_frame(msg_id)
    }

    /// Handle incoming events
    ///
    /// Queued faults apply here too, though message id mismatches are only
    /// visible via [Engine::handle] as outputs carry no message id.
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        let fault = self.next_fault(evt);
        self.apply(evt, fault)
    }

    /// Take the next queued fault, if this event consumes one
    fn next_fault(&mut self, evt: &Event) -> Option<Fault> {
        match evt {
            Event::Encrypted { .. } => self.faults.pop_front(),
            Event::Connect { .. } => None,
        }
    }

    fn apply(&mut self, evt: &Event, fault: Option<Fault>) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("event: {:02x?}", evt.msg_id());

        match evt {
            Event::Connect { req, .. } => self.connect(&req.public_key),
            Event::Encrypted { req, .. } => self.encrypted(req, fault),
        }
    }

    /// Handle handshake requests, rotating the ephemeral key for this host
    fn connect(&mut self, identity: &PublicKey) -> Result<Output, Error> {
        if self.locked {
            return Ok(Output::connect_error(ResponseCode::DeviceLocked));
        }

        let key = *identity.as_bytes();

        let ephemeral = KeyPair::random(&mut self.rng);
        let secret = ephemeral.shared_secret(identity)?;
        let fw_version = self.drv.fw_version();

        // Invalidate any prior session for this host
        let app_name = match self.clients.remove(&key) {
            Some(c) => {
                self.sessions.remove(&c.session_id);
                c.app_name
            }
            None => None,
        };

        let (resp, salt) = match app_name {
            Some(_) => {
                let r = ConnectResp::paired(
                    ephemeral.public_key(),
                    fw_version,
                    &self.wallets,
                    &secret,
                )?;
                (r, None)
            }
            None => {
                let mut salt = [0u8; PAIRING_SALT_LEN];
                self.rng.fill_bytes(&mut salt);

                let r = ConnectResp::unpaired(ephemeral.public_key(), fw_version, salt);
                (r, Some(salt))
            }
        };

        #[cfg(feature = "log")]
        log::debug!(
            "connect from {:02x?}, paired: {}",
            &key[1..9],
            app_name.is_some()
        );

        let session_id = secret.ephemeral_id();
        self.sessions.insert(session_id, key);
        self.clients.insert(
            key,
            Client {
                identity: *identity,
                ephemeral,
                session_id,
                salt,
                app_name,
            },
        );

        Ok(Output::Connect(resp))
    }

    /// Handle encrypted requests
    fn encrypted(&mut self, req: &EncryptedReq, fault: Option<Fault>) -> Result<Output, Error> {
        match fault {
            Some(Fault::Status(code)) => return Ok(Output::encrypted_error(code)),
            Some(Fault::ForgetSessions) => self.forget_sessions(),
            Some(Fault::MsgIdMismatch) | None => (),
        }

        if self.locked {
            return Ok(Output::encrypted_error(ResponseCode::DeviceLocked));
        }

        // Locate session via ephemeral identifier
        let key = match self.sessions.get(&req.ephemeral_id) {
            Some(k) => *k,
            None => {
                #[cfg(feature = "log")]
                log::warn!("no session for ephemeral id {:08x}", req.ephemeral_id);

                return Ok(Output::encrypted_error(ResponseCode::InvalidEphemId));
            }
        };

        let (identity, secret) = match self.clients.get(&key) {
            Some(c) => (c.identity, c.ephemeral.shared_secret(&c.identity)?),
            None => return Ok(Output::encrypted_error(ResponseCode::InvalidEphemId)),
        };

        // Decrypt and check request
        let (op, data) = match req.open(&secret) {
            Ok(v) => v,
            Err(_) => return Ok(Output::encrypted_error(ResponseCode::InvalidMsg)),
        };
        let op = match RequestType::try_from(op) {
            Ok(v) => v,
            Err(_) => return Ok(Output::encrypted_error(ResponseCode::InvalidMsg)),
        };

        #[cfg(feature = "log")]
        log::debug!("request: {} ({:08x})", op, req.ephemeral_id);

        // Execute operation
        let result = match self.execute(&key, op, &data) {
            Ok(v) => v,
            Err(code) => return Ok(Output::encrypted_error(code)),
        };

        // Rotate ephemeral key, sealing the response under the prior secret
        let next = KeyPair::random(&mut self.rng);
        let next_id = next.shared_secret(&identity)?.ephemeral_id();

        let block = EncryptedResp::seal(&secret, &next.public_key(), &result)?;

        if let Some(c) = self.clients.get_mut(&key) {
            self.sessions.remove(&c.session_id);
            self.sessions.insert(next_id, key);

            c.ephemeral = next;
            c.session_id = next_id;
        }

        Ok(Output::Encrypted(block))
    }

    /// Execute a decrypted operation, returning result data or a failure code
    fn execute(
        &mut self,
        key: &[u8; PUBLIC_KEY_LEN],
        op: RequestType,
        data: &[u8],
    ) -> Result<Vec<u8>, ResponseCode> {
        let paired = self.clients.get(key).map(|c| c.paired()).unwrap_or(false);

        match op {
            RequestType::FinalizePairing => {
                if paired {
                    return Err(ResponseCode::Already);
                }
                self.finalize_pairing(key, data)?;
                Ok(vec![])
            }
            _ if !paired => Err(ResponseCode::InvalidMsg),
            RequestType::GetWallets => Ok(self.wallets.to_bytes().to_vec()),
            RequestType::GetAddresses => Ok(self.derive_addresses(data)),
            RequestType::Test => {
                let n = data.len().min(op.response_len());
                Ok(data[..n].to_vec())
            }
            RequestType::Sign
            | RequestType::GetKvRecords
            | RequestType::AddKvRecords
            | RequestType::RemoveKvRecords
            | RequestType::FetchEncryptedData => Err(ResponseCode::Disabled),
        }
    }

    /// Verify pairing signature and mark the host as paired
    fn finalize_pairing(
        &mut self,
        key: &[u8; PUBLIC_KEY_LEN],
        data: &[u8],
    ) -> Result<(), ResponseCode> {
        if !self.pairing_enabled {
            return Err(ResponseCode::PairDisabled);
        }

        let (req, _) =
            FinalizePairingReq::decode_owned(data).map_err(|_| ResponseCode::InvalidMsg)?;

        let secret = self.drv.pairing_secret();
        let c = self.clients.get_mut(key).ok_or(ResponseCode::InvalidMsg)?;
        let salt = c.salt.ok_or(ResponseCode::PairFailed)?;

        if req.verify(&c.identity, &salt, secret).is_err() {
            #[cfg(feature = "log")]
            log::warn!("pairing signature verification failed");

            return Err(ResponseCode::PairFailed);
        }

        // Salts are single use
        c.salt = None;
        c.app_name = Some(req.app_name);

        Ok(())
    }

    /// Derive deterministic address data for the provided request
    fn derive_addresses(&self, data: &[u8]) -> Vec<u8> {
        let seed = self.drv.derive(data);
        let mut r = vec![0u8; RequestType::GetAddresses.response_len()];

        for (i, c) in r.chunks_mut(32).enumerate() {
            let h = Sha256::new()
                .chain_update(seed)
                .chain_update((i as u32).to_be_bytes())
                .finalize();
            c.copy_from_slice(&h[..c.len()]);
        }

        r
    }

    /// Queue a fault to be applied to a subsequent encrypted request
    pub fn inject(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    /// Clear queued faults
    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Discard all host sessions (as on device restart), pairings are retained
    pub fn forget_sessions(&mut self) {
        self.sessions.clear();
    }

    /// Fetch active wallets
    pub fn wallets(&self) -> &ActiveWallets {
        &self.wallets
    }

    /// Set active wallets
    pub fn set_wallets(&mut self, wallets: ActiveWallets) {
        self.wallets = wallets;
    }

    /// Enable or disable pairing
    pub fn set_pairing_enabled(&mut self, enabled: bool) {
        self.pairing_enabled = enabled;
    }

    /// Check whether a host identity is paired
    pub fn is_paired(&self, identity: &PublicKey) -> bool {
        self.clients
            .get(identity.as_bytes())
            .map(|c| c.paired())
            .unwrap_or(false)
    }

    /// Fetch the shared secret for a host's current session
    pub fn session_secret(&self, identity: &PublicKey) -> Option<SharedSecret> {
        let c = self.clients.get(identity.as_bytes())?;
        c.ephemeral.shared_secret(&c.identity).ok()
    }

    /// Lock the device, rejecting requests until unlocked
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Unlock the device
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Fetch driver instance
    pub fn driver(&self) -> &DRV {
        &self.drv
    }
}
