// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Retry and resynchronisation policy for device requests

use std::{future::Future, time::Duration};

use log::{debug, warn};

use keylink_proto::{RequestType, ResponseCode};

use crate::{DeviceHandle, Error, Transport};

/// Bounded retry policy for device requests
#[derive(Clone, PartialEq, Debug)]
pub struct RetryPolicy {
    /// Additional attempts permitted after the first
    pub retries: usize,
    /// Delay before retrying a busy device
    pub backoff: Duration,
    /// Refresh active wallets on [ResponseCode::WrongWallet]
    pub refresh_wallets: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
            refresh_wallets: true,
        }
    }
}

/// Recovery action required prior to retrying a failed request
#[derive(Copy, Clone, PartialEq, Debug)]
enum Recovery {
    Backoff,
    RefreshWallets,
    Reconnect,
}

impl RetryPolicy {
    /// Policy performing no retries
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Default::default()
        }
    }

    /// Select the recovery action for an error, `None` if the error must be propagated
    fn recovery(&self, e: &Error) -> Option<Recovery> {
        match e {
            Error::Device(c) if c.is_user_terminal() => None,
            Error::Device(ResponseCode::DeviceBusy | ResponseCode::GceTimeout) => {
                Some(Recovery::Backoff)
            }
            Error::Device(ResponseCode::WrongWallet) if self.refresh_wallets => {
                Some(Recovery::RefreshWallets)
            }
            Error::Device(ResponseCode::InvalidEphemId) | Error::Resync { .. } => {
                Some(Recovery::Reconnect)
            }
            _ => None,
        }
    }
}

impl<T: Transport> DeviceHandle<T> {
    /// Execute `op` against this handle, recovering from transient device
    /// errors per the provided [RetryPolicy].
    ///
    /// `op` is invoked at most `policy.retries + 1` times.
    pub async fn retry<R, F, Fut>(&self, policy: &RetryPolicy, op: F) -> Result<R, Error>
    where
        F: Fn(Self) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let mut attempt = 0;

        loop {
            let e = match op(self.clone()).await {
                Ok(r) => return Ok(r),
                Err(e) => e,
            };

            let recovery = match policy.recovery(&e) {
                Some(r) if attempt < policy.retries => r,
                _ => return Err(e),
            };

            attempt += 1;

            warn!(
                "Request failed: {} (attempt {}/{}, recovery: {:?})",
                e,
                attempt,
                policy.retries + 1,
                recovery
            );

            match recovery {
                Recovery::Backoff => tokio::time::sleep(policy.backoff).await,
                Recovery::RefreshWallets => {
                    let w = self.fetch_active_wallets().await?;
                    debug!("Refreshed active wallets: {:?}", w.active());
                }
                Recovery::Reconnect => {
                    let device_id = self.device_id().await.ok_or(Error::MustReconnect)?;
                    self.connect(&device_id).await?;
                }
            }
        }
    }

    /// Issue an encrypted request using the configured [RetryPolicy]
    pub async fn encrypted_request_retry(
        &self,
        op: RequestType,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let policy = self.config().retry_policy();

        self.retry(&policy, |h| async move { h.encrypted_request(op, data).await })
            .await
    }
}
