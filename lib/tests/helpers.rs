// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(dead_code)]

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use log::{debug, LevelFilter};
use simplelog::SimpleLogger;

use keylink::{Config, DeviceHandle, Error, PairingStatus, Transport};
use keylink_core::{
    engine::{Driver, Engine},
    helpers::SeedDriver,
};
use keylink_proto::wallet::{ActiveWallets, Wallet};

pub const DEVICE_ID: &str = "device-1";

pub const PAIRING_SECRET: &str = "12345678";

/// Current firmware version (3.15.0)
pub const FW_CURRENT: [u8; 4] = [0, 15, 3, 0];

/// Legacy firmware (no version reported)
pub const FW_LEGACY: [u8; 4] = [0, 0, 0, 0];

pub type TestEngine = Engine<SeedDriver>;

/// Setup logging using the `LOG_LEVEL` environment variable
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();

    let _ = SimpleLogger::init(log_level, log_cfg);
}

/// Create a test engine with the provided firmware version
pub fn engine(fw_version: [u8; 4]) -> TestEngine {
    let drv = SeedDriver::new([0x11; 32], fw_version, PAIRING_SECRET.as_bytes());

    let wallets = ActiveWallets {
        internal: Wallet::new(drv.derive(b"wallet"), 1, "main"),
        external: Wallet::default(),
    };

    let mut e = Engine::new(drv);
    e.set_wallets(wallets);
    e
}

/// In-process transport, delivering frames directly to a shared [TestEngine]
/// and counting exchanges
#[derive(Clone)]
pub struct SimTransport {
    engine: Arc<Mutex<TestEngine>>,
    calls: Arc<AtomicUsize>,
}

impl SimTransport {
    pub fn new(engine: TestEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Execute a function against the engine, for fault injection
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut TestEngine) -> R) -> R {
        let mut e = self.engine.lock().unwrap();
        f(&mut e)
    }

    /// Number of exchanges performed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        debug!("exchange {} ({} bytes)", device_id, frame.len());

        let mut e = self.engine.lock().unwrap();
        e.handle(frame).map_err(|e| Error::Transport(e.into()))
    }
}

/// Test configuration, with a short backoff
pub fn config() -> Config {
    Config {
        app_name: "keylink-tests".to_string(),
        backoff_ms: 1,
        ..Default::default()
    }
}

/// Setup a handle connected and paired with a new engine
pub async fn paired(fw_version: [u8; 4]) -> (SimTransport, DeviceHandle<SimTransport>) {
    setup_logging();

    let t = SimTransport::new(engine(fw_version));
    let h = DeviceHandle::new(t.clone(), config());

    let paired = h.connect(DEVICE_ID).await.unwrap();
    assert!(!paired);
    assert_eq!(h.pairing_status().await, PairingStatus::PairingPending);

    h.pair(PAIRING_SECRET).await.unwrap();
    assert_eq!(h.pairing_status().await, PairingStatus::Paired);

    t.reset_calls();

    (t, h)
}
