// Copyright (c) 2022-2023 The MobileCoin Foundation

//! KeyLink host library
//!
//! Provides encrypted, authenticated sessions with KeyLink signing devices,
//! reachable over an HTTP relay via [HttpTransport] or any other [Transport].
//!
//! A [DeviceHandle] owns the [SessionState] for a device. Typical use is to
//! [connect][DeviceHandle::connect], [pair][DeviceHandle::pair] once with the
//! secret shown on the device, then issue requests with
//! [encrypted_request][DeviceHandle::encrypted_request], persisting the session
//! via [export_session][DeviceHandle::export_session] or a [SessionStore].

/// Re-export `keylink-proto` for consumers
pub use keylink_proto::{self as proto};

pub use proto::{RequestType, ResponseCode};

mod config;
pub use config::{Config, DEFAULT_APP_NAME, DEFAULT_BASE_URL};

mod error;
pub use error::Error;

mod handle;
pub use handle::DeviceHandle;

mod retry;
pub use retry::RetryPolicy;

pub mod session;
pub use session::{FileStore, MemoryStore, PairingStatus, SessionState, SessionStore};

pub mod transport;
pub use transport::Transport;

#[cfg(feature = "transport_http")]
pub use transport::HttpTransport;

/// Device handle using the HTTP relay transport
#[cfg(feature = "transport_http")]
pub type HttpHandle = DeviceHandle<HttpTransport>;

#[cfg(feature = "transport_http")]
impl HttpHandle {
    /// Create a new HTTP device handle using the relay configured in `config`
    pub fn http(config: Config) -> Self {
        let t = HttpTransport::new(&config.base_url);
        Self::new(t, config)
    }
}
