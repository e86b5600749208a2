// Copyright (c) 2022-2023 The MobileCoin Foundation

//! KeyLink device simulator
//!
//! Exposes one or more [Engine] instances over the KeyLink HTTP relay
//! protocol (`POST /{device_id}` with a hex-encoded frame), for use in
//! integration tests or via the `keylink-sim` binary.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use log::{debug, info, warn};
use tokio::{net::TcpListener, task::JoinHandle};

use keylink_core::{
    engine::{Driver, Engine},
    helpers::SeedDriver,
};
use keylink_proto::{
    connect::FW_VERSION_LEN,
    envelope::{HttpRequest, HttpResponse},
    firmware::FwVersion,
    wallet::{ActiveWallets, Wallet},
};

/// Simulated device engine
pub type SimEngine = Engine<SeedDriver>;

/// Default simulator seed
pub const DEFAULT_SEED: [u8; 32] = [0x5e; 32];

/// Default pairing secret displayed by simulated devices
pub const DEFAULT_PAIRING_SECRET: &str = "12345678";

/// Default simulated firmware version
pub const DEFAULT_FW_VERSION: FwVersion = FwVersion::new(3, 15, 0);

/// Handling for requests addressed to unknown device ids
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnknownDevice {
    /// Create a new device on first request
    Create,
    /// Reject requests with a 404 status
    Reject,
}

/// Simulator options
#[derive(Clone, Debug, PartialEq, clap::Parser)]
pub struct Options {
    /// Device seed (hex encoded, 32 bytes)
    #[clap(
        long,
        env,
        value_parser = parse_seed,
        default_value = "5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e"
    )]
    pub seed: [u8; 32],

    /// Firmware version reported by devices (`major.minor.fix`, `0.0.0` for legacy firmware)
    #[clap(long, env, value_parser = parse_fw_version, default_value = "3.15.0")]
    pub fw_version: [u8; FW_VERSION_LEN],

    /// Pairing secret displayed by devices
    #[clap(long, env, default_value = DEFAULT_PAIRING_SECRET)]
    pub pairing_secret: String,

    /// Handling for unknown device ids
    #[clap(long, value_enum, default_value = "create")]
    pub unknown: UnknownDevice,
}

impl Default for Options {
    fn default() -> Self {
        let mut fw_version = [0u8; FW_VERSION_LEN];
        fw_version[..3].copy_from_slice(&DEFAULT_FW_VERSION.to_raw());

        Self {
            seed: DEFAULT_SEED,
            fw_version,
            pairing_secret: DEFAULT_PAIRING_SECRET.to_string(),
            unknown: UnknownDevice::Create,
        }
    }
}

/// Parse a hex encoded seed
pub fn parse_seed(s: &str) -> Result<[u8; 32], String> {
    let v = hex::decode(s).map_err(|e| format!("invalid seed: {e}"))?;
    v.try_into()
        .map_err(|_| "seed must be 32 bytes".to_string())
}

/// Parse a `major.minor.fix` firmware version to the raw device encoding
pub fn parse_fw_version(s: &str) -> Result<[u8; FW_VERSION_LEN], String> {
    let p = s
        .split('.')
        .map(|v| v.parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid firmware version: {e}"))?;

    match p[..] {
        [major, minor, fix] => Ok([fix, minor, major, 0]),
        _ => Err("firmware version must be major.minor.fix".to_string()),
    }
}

/// Device simulator, clones share the same device set
#[derive(Clone)]
pub struct Simulator {
    devices: Arc<Mutex<HashMap<String, SimEngine>>>,
    opts: Arc<Options>,
}

impl Simulator {
    /// Create a new simulator with the provided options
    pub fn new(opts: Options) -> Self {
        Self {
            devices: Arc::new(Mutex::new(HashMap::new())),
            opts: Arc::new(opts),
        }
    }

    /// Create a new simulated device engine using the simulator options
    fn engine(&self) -> SimEngine {
        let drv = SeedDriver::new(
            self.opts.seed,
            self.opts.fw_version,
            self.opts.pairing_secret.as_bytes(),
        );

        let wallets = ActiveWallets {
            internal: Wallet::new(drv.derive(b"wallet"), 1, "main"),
            external: Wallet::default(),
        };

        let mut e = Engine::new(drv);
        e.set_wallets(wallets);
        e
    }

    /// Add a device, replacing any existing device with the same id
    pub fn add_device(&self, device_id: &str) {
        let e = self.engine();
        if let Ok(mut d) = self.devices.lock() {
            d.insert(device_id.to_string(), e);
        }
    }

    /// Execute a function against a device engine, for fault injection
    /// and inspection. Returns `None` for unknown devices.
    pub fn with_device<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&mut SimEngine) -> R,
    ) -> Option<R> {
        let mut d = self.devices.lock().ok()?;
        d.get_mut(device_id).map(f)
    }

    /// Handle an incoming request envelope for the specified device
    pub fn handle(&self, device_id: &str, req: &HttpRequest) -> HttpResponse {
        let frame = match req.frame() {
            Ok(f) => f,
            Err(e) => return HttpResponse::error(400, &format!("invalid request data: {e}")),
        };

        let mut devices = match self.devices.lock() {
            Ok(d) => d,
            Err(_) => return HttpResponse::error(500, "simulator state poisoned"),
        };

        if !devices.contains_key(device_id) {
            match self.opts.unknown {
                UnknownDevice::Create => {
                    info!("Creating device: {}", device_id);
                    devices.insert(device_id.to_string(), self.engine());
                }
                UnknownDevice::Reject => {
                    warn!("Unknown device: {}", device_id);
                    return HttpResponse::error(404, &format!("unknown device: {device_id}"));
                }
            }
        }

        let e = match devices.get_mut(device_id) {
            Some(e) => e,
            None => return HttpResponse::error(404, &format!("unknown device: {device_id}")),
        };

        debug!("Request for {} ({} bytes)", device_id, frame.len());

        match e.handle(&frame) {
            Ok(r) => HttpResponse::ok(&r),
            Err(err) => {
                warn!("Request for {} failed: {}", device_id, err);
                HttpResponse::error(400, &err.to_string())
            }
        }
    }

    /// Build an axum [Router] for this simulator
    pub fn router(&self) -> Router {
        Router::new()
            .route("/:device_id", post(exchange))
            .with_state(self.clone())
    }

    /// Bind to the provided address and serve requests in a background task,
    /// returning the bound address and task handle
    pub async fn bind(&self, addr: SocketAddr) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("Simulator listening on http://{}", addr);

        let router = self.router();
        let h = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("Simulator server error: {}", e);
            }
        });

        Ok((addr, h))
    }
}

/// Relay endpoint, exchanging a request frame with the addressed device
async fn exchange(
    State(s): State<Simulator>,
    Path(device_id): Path<String>,
    Json(req): Json<HttpRequest>,
) -> (StatusCode, Json<HttpResponse>) {
    let resp = s.handle(&device_id, &req);

    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(resp))
}
