//! Generic transport abstraction for delivering frames to devices
//!
// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;

/// Transport for exchanging request and response frames with a device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request frame to the specified device, returning the response frame
    async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Shared transports
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error> {
        T::exchange(self, device_id, frame).await
    }
}

/// Boxed transports, for consumers abstracting over transport types
#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error> {
        T::exchange(self, device_id, frame).await
    }
}

#[cfg(feature = "transport_http")]
pub use http::HttpTransport;

#[cfg(feature = "transport_http")]
mod http {
    use async_trait::async_trait;
    use log::{debug, trace};

    use keylink_proto::envelope::{HttpRequest, HttpResponse, HTTP_STATUS_OK};

    use super::Transport;
    use crate::Error;

    /// HTTP transport, posting hex-encoded frames to `{base_url}/{device_id}`
    #[derive(Clone, Debug)]
    pub struct HttpTransport {
        client: reqwest::Client,
        base_url: String,
    }

    impl HttpTransport {
        /// Create a new HTTP transport for the provided base URL
        pub fn new(base_url: &str) -> Self {
            Self {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
            }
        }

        /// Fetch the base URL for this transport
        pub fn base_url(&self) -> &str {
            &self.base_url
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error> {
            let url = format!("{}/{}", self.base_url, device_id);

            debug!("POST {} ({} bytes)", url, frame.len());
            trace!("request: {:02x?}", frame);

            let resp = self
                .client
                .post(&url)
                .json(&HttpRequest::new(frame))
                .send()
                .await
                .map_err(|e| Error::Transport(e.into()))?;

            let resp: HttpResponse = resp
                .json()
                .await
                .map_err(|e| Error::Transport(e.into()))?;

            if resp.status != HTTP_STATUS_OK {
                return Err(Error::Transport(anyhow::anyhow!(
                    "request failed (status: {}): {}",
                    resp.status,
                    resp.message
                )));
            }

            match resp.frame() {
                Some(Ok(f)) => Ok(f),
                Some(Err(e)) => Err(Error::Transport(anyhow::anyhow!(
                    "invalid response data: {e}"
                ))),
                None => Err(Error::Transport(anyhow::anyhow!(
                    "response missing data: {}",
                    resp.message
                ))),
            }
        }
    }
}
