// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for KeyLink devices
//!
//! This provides methods for interacting with a device over a [Transport],
//! owning the [SessionState] for the connection. All exchanges on a handle
//! (and its clones) are serialised through a single FIFO queue, so the
//! ephemeral key rotation performed by each exchange is never interleaved.

use std::{sync::Arc, time::Duration};

use encdec::{DecodeOwned, Encode};
use log::{debug, info, warn};
use rand_core::{OsRng, RngCore};
use tokio::sync::Mutex;

use keylink_proto::{
    connect::{ConnectReq, ConnectResp, DevicePairing, CONNECT_RESP_LEN},
    encrypted::{EncryptedReq, EncryptedResp, ENCRYPTED_REQ_LEN},
    firmware::FwCapabilities,
    frame::{decode_response, encode_frame, CONNECT_REQ_PAYLOAD_LEN, ENCRYPTED_RESP_LEN},
    pairing::{app_name_bytes, FinalizePairingReq, FINALIZE_PAIRING_LEN},
    wallet::ActiveWallets,
    MsgType, ProtoError, RequestType, ResponseCode,
};

use crate::{
    session::{PairingStatus, SessionState, SessionStore},
    Config, Error, Transport,
};

/// Handle for a KeyLink device, generic over [Transport] types.
///
/// Clones share the same session and request queue.
pub struct DeviceHandle<T: Transport> {
    inner: Arc<Mutex<Inner<T>>>,
    config: Arc<Config>,
}

impl<T: Transport> Clone for DeviceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
        }
    }
}

struct Inner<T: Transport> {
    t: T,
    session: SessionState,
    store: Option<Box<dyn SessionStore>>,
}

impl<T: Transport> DeviceHandle<T> {
    /// Create a new handle with a random identity key
    pub fn new(t: T, config: Config) -> Self {
        Self::with_session(t, config, SessionState::random(), None)
    }

    /// Create a handle from an existing session
    pub fn with_session(
        t: T,
        config: Config,
        session: SessionState,
        store: Option<Box<dyn SessionStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { t, session, store })),
            config: Arc::new(config),
        }
    }

    /// Restore a handle from an exported session blob
    pub fn restore(t: T, config: Config, blob: &str) -> Result<Self, Error> {
        let session = SessionState::from_json(blob)?;
        Ok(Self::with_session(t, config, session, None))
    }

    /// Load a handle from the provided [SessionStore], creating a new session
    /// if none is stored. The session is saved to the store on every update.
    pub fn load(t: T, config: Config, store: impl SessionStore + 'static) -> Result<Self, Error> {
        let session = match store.load().map_err(Error::Store)? {
            Some(blob) => {
                debug!("Restoring stored session");
                SessionState::from_json(&blob)?
            }
            None => SessionState::random(),
        };

        Ok(Self::with_session(t, config, session, Some(Box::new(store))))
    }

    /// Fetch handle configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to a device, rotating the device ephemeral key.
    ///
    /// Returns whether the device reports this host as paired.
    pub async fn connect(&self, device_id: &str) -> Result<bool, Error> {
        self.connect_with_timeout(device_id, self.config.timeout())
            .await
    }

    /// Connect to a device with the provided timeout
    pub async fn connect_with_timeout(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.lock().await;
        inner.connect(device_id, timeout).await
    }

    /// Pair with the device using the secret displayed by the device.
    ///
    /// Requires a prior [connect][Self::connect] reporting the host as unpaired,
    /// returns the active wallets fetched once pairing completes.
    pub async fn pair(&self, secret: &str) -> Result<ActiveWallets, Error> {
        self.pair_with_timeout(secret, self.config.timeout()).await
    }

    /// Pair with the device, applying `timeout` to each exchange
    pub async fn pair_with_timeout(
        &self,
        secret: &str,
        timeout: Duration,
    ) -> Result<ActiveWallets, Error> {
        let mut inner = self.inner.lock().await;

        let status = inner.session.pairing_status();
        if status != PairingStatus::PairingPending {
            return Err(Error::InvalidState {
                actual: status,
                expected: PairingStatus::PairingPending,
            });
        }

        let app_name = app_name_bytes(&self.config.app_name).ok_or(Error::InvalidAppName)?;

        let salt = match inner.session.pairing_salt() {
            Some(s) => *s,
            None => return Err(Error::Session("missing pairing salt".to_string())),
        };

        debug!("Finalizing pairing");

        let req = FinalizePairingReq::sign(
            inner.session.identity(),
            app_name,
            &salt,
            secret.as_bytes(),
        );
        let mut data = [0u8; FINALIZE_PAIRING_LEN];
        req.encode(&mut data)?;

        inner
            .request(RequestType::FinalizePairing, &data, timeout)
            .await?;

        inner.session.set_paired(None);
        inner.save()?;

        info!("Pairing complete");

        inner.fetch_active_wallets(timeout).await
    }

    /// Issue an encrypted request using the configured timeout,
    /// returning result data trimmed to the fixed length for `op`
    pub async fn encrypted_request(&self, op: RequestType, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.encrypted_request_with_timeout(op, data, self.config.timeout())
            .await
    }

    /// Issue an encrypted request with the provided timeout
    pub async fn encrypted_request_with_timeout(
        &self,
        op: RequestType,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let mut inner = self.inner.lock().await;

        // Check we are connected and paired
        inner.session.shared_secret()?;

        let status = inner.session.pairing_status();
        if status != PairingStatus::Paired {
            return Err(Error::InvalidState {
                actual: status,
                expected: PairingStatus::Paired,
            });
        }

        // Check request size against firmware limits
        let max = match inner.session.capabilities().max_request_size(op) {
            Some(v) => v,
            None => return Err(Error::Unsupported(op)),
        };
        if data.len() > max {
            return Err(Error::DataTooLarge {
                len: data.len(),
                max,
            });
        }

        inner.request(op, data, timeout).await
    }

    /// Fetch active wallets from the device, updating the session
    pub async fn fetch_active_wallets(&self) -> Result<ActiveWallets, Error> {
        let mut inner = self.inner.lock().await;

        inner.session.shared_secret()?;

        inner.fetch_active_wallets(self.config.timeout()).await
    }

    /// Fetch a snapshot of the session state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.session.clone()
    }

    /// Fetch device firmware capabilities
    pub async fn capabilities(&self) -> FwCapabilities {
        self.inner.lock().await.session.capabilities().clone()
    }

    /// Fetch cached active wallets
    pub async fn active_wallets(&self) -> ActiveWallets {
        *self.inner.lock().await.session.active_wallets()
    }

    /// Fetch the current pairing status
    pub async fn pairing_status(&self) -> PairingStatus {
        self.inner.lock().await.session.pairing_status()
    }

    /// Fetch the device this session is bound to
    pub async fn device_id(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .device_id()
            .map(|v| v.to_string())
    }

    /// Export the session as an opaque blob, see [DeviceHandle::restore]
    pub async fn export_session(&self) -> Result<String, Error> {
        self.inner.lock().await.session.to_json()
    }
}

impl<T: Transport> Inner<T> {
    /// Save session to the configured store
    fn save(&self) -> Result<(), Error> {
        if let Some(s) = &self.store {
            let blob = self.session.to_json()?;
            s.save(&blob).map_err(Error::Store)?;
        }
        Ok(())
    }

    /// Exchange a frame with the device
    async fn exchange(
        &self,
        device_id: &str,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let r = tokio::time::timeout(timeout, self.t.exchange(device_id, frame)).await;

        match r {
            Ok(r) => r,
            Err(e) => {
                warn!("Request to {} timed out after {:?}", device_id, timeout);
                Err(e.into())
            }
        }
    }

    async fn connect(&mut self, device_id: &str, timeout: Duration) -> Result<bool, Error> {
        debug!("Connecting to device {}", device_id);

        let msg_id = OsRng.next_u32();

        let req = ConnectReq::new(self.session.identity_public());
        let mut p = [0u8; CONNECT_REQ_PAYLOAD_LEN];
        req.encode(&mut p)?;

        let frame = encode_frame(MsgType::Secure, msg_id, &p)?;
        let resp = self.exchange(device_id, &frame, timeout).await?;

        let r = decode_response(&resp, CONNECT_RESP_LEN, msg_id)?;
        if r.code != ResponseCode::Success {
            return Err(Error::Device(r.code));
        }

        let (c, _) = ConnectResp::decode_owned(r.body)?;

        // Compute new session values prior to updating state
        let secret = self.session.derive_secret(&c.ephemeral_pub)?;
        let capabilities = FwCapabilities::resolve(&c.fw_version[..3])?;
        let wallets = c.wallets(&secret)?;
        let salt = c.salt();

        self.session.set_peer(c.ephemeral_pub, secret);
        self.session
            .set_connected(device_id, c.fw_version, capabilities);

        let paired = match (c.pairing, salt) {
            (DevicePairing::Paired, _) => {
                self.session.set_paired(wallets);
                true
            }
            (DevicePairing::NotPaired, Some(s)) => {
                self.session.set_pairing_pending(s);
                false
            }
            (DevicePairing::NotPaired, None) => {
                return Err(Error::Proto(ProtoError::InvalidEncoding))
            }
        };

        info!(
            "Connected to {} (firmware: {:?}, paired: {})",
            device_id,
            self.session.firmware(),
            paired
        );

        self.save()?;

        Ok(paired)
    }

    /// Issue an encrypted request, adopting the next device ephemeral key on success
    async fn request(
        &mut self,
        op: RequestType,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let device_id = match self.session.device_id() {
            Some(d) => d.to_string(),
            None => return Err(Error::MustReconnect),
        };
        let secret = self.session.shared_secret()?.clone();

        let msg_id = OsRng.next_u32();

        debug!(
            "Request {} ({} bytes, ephemeral id: {:08x})",
            op,
            data.len(),
            secret.ephemeral_id()
        );

        let req = EncryptedReq::seal(&secret, op, data)?;
        let mut p = [0u8; ENCRYPTED_REQ_LEN];
        req.encode(&mut p)?;

        let frame = encode_frame(MsgType::Secure, msg_id, &p)?;
        let resp = self.exchange(&device_id, &frame, timeout).await?;

        // Message id mismatches map to Error::Resync and leave the session untouched
        let r = decode_response(&resp, ENCRYPTED_RESP_LEN, msg_id)?;
        if r.code != ResponseCode::Success {
            debug!("Request {} failed: {}", op, r.code);
            return Err(Error::Device(r.code));
        }

        let e = EncryptedResp::open(&secret, r.body)?;

        // Rotate to the next device ephemeral key
        let next = self.session.derive_secret(&e.next_pub)?;
        self.session.set_peer(e.next_pub, next);
        self.save()?;

        Ok(e.result(op).to_vec())
    }

    async fn fetch_active_wallets(&mut self, timeout: Duration) -> Result<ActiveWallets, Error> {
        let r = self.request(RequestType::GetWallets, &[], timeout).await?;

        let (w, _) = ActiveWallets::decode_owned(&r)?;

        self.session.set_active_wallets(w);
        self.save()?;

        Ok(w)
    }
}
