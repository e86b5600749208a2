// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use keylink::{Error, RequestType, ResponseCode, RetryPolicy};
use keylink_core::engine::Fault;
use keylink_proto::wallet::{ActiveWallets, Wallet};

mod helpers;
use helpers::*;

fn policy(retries: usize) -> RetryPolicy {
    RetryPolicy {
        retries,
        backoff: Duration::from_millis(1),
        refresh_wallets: true,
    }
}

#[tokio::test]
async fn retry_busy_exhausted() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| {
        for _ in 0..8 {
            e.inject(Fault::Status(ResponseCode::DeviceBusy));
        }
    });

    let r = h
        .retry(&policy(3), |h| async move {
            h.encrypted_request(RequestType::GetWallets, &[]).await
        })
        .await;

    assert!(matches!(r, Err(Error::Device(ResponseCode::DeviceBusy))));
    assert_eq!(t.calls(), 4);

    Ok(())
}

#[tokio::test]
async fn retry_busy_recovers() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| {
        e.inject(Fault::Status(ResponseCode::DeviceBusy));
        e.inject(Fault::Status(ResponseCode::GceTimeout));
    });

    let r = h
        .retry(&policy(3), |h| async move {
            h.encrypted_request(RequestType::GetWallets, &[]).await
        })
        .await?;

    assert_eq!(r.len(), RequestType::GetWallets.response_len());
    assert_eq!(t.calls(), 3);

    Ok(())
}

#[tokio::test]
async fn retry_no_budget() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| e.inject(Fault::Status(ResponseCode::DeviceBusy)));

    let r = h
        .retry(&RetryPolicy::none(), |h| async move {
            h.encrypted_request(RequestType::GetWallets, &[]).await
        })
        .await;

    assert!(matches!(r, Err(Error::Device(ResponseCode::DeviceBusy))));
    assert_eq!(t.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn retry_user_declined() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| {
        e.inject(Fault::Status(ResponseCode::UserDeclined));
        e.inject(Fault::Status(ResponseCode::UserTimeout));
    });

    let r = h
        .encrypted_request_retry(RequestType::GetAddresses, &[])
        .await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::UserDeclined))));
    assert_eq!(t.calls(), 1);

    let r = h
        .encrypted_request_retry(RequestType::GetAddresses, &[])
        .await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::UserTimeout))));
    assert_eq!(t.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn retry_wrong_wallet() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    // Switch wallets on the device
    let updated = ActiveWallets {
        internal: Wallet::default(),
        external: Wallet::new([0x22; 32], 3, "hardware"),
    };
    t.with_engine(|e| {
        e.set_wallets(updated);
        e.inject(Fault::Status(ResponseCode::WrongWallet));
    });

    assert_ne!(h.active_wallets().await, updated);

    h.encrypted_request_retry(RequestType::GetAddresses, &[])
        .await?;

    // Failed request, wallet refresh, retried request
    assert_eq!(t.calls(), 3);
    assert_eq!(h.active_wallets().await, updated);
    assert_eq!(h.active_wallets().await.active().map(|w| w.name()), Some("hardware".to_string()));

    Ok(())
}

#[tokio::test]
async fn retry_wrong_wallet_disabled() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| e.inject(Fault::Status(ResponseCode::WrongWallet)));

    let p = RetryPolicy {
        refresh_wallets: false,
        ..policy(3)
    };

    let r = h
        .retry(&p, |h| async move {
            h.encrypted_request(RequestType::GetAddresses, &[]).await
        })
        .await;

    assert!(matches!(r, Err(Error::Device(ResponseCode::WrongWallet))));
    assert_eq!(t.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn retry_invalid_ephemeral_id() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    let peer = h.state().await.peer_key().copied();

    // Device restarts, discarding sessions
    t.with_engine(|e| e.inject(Fault::ForgetSessions));

    h.encrypted_request_retry(RequestType::GetAddresses, &[])
        .await?;

    // Failed request, reconnect, retried request
    assert_eq!(t.calls(), 3);
    assert_ne!(h.state().await.peer_key().copied(), peer);

    Ok(())
}

#[tokio::test]
async fn retry_resync() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| e.inject(Fault::MsgIdMismatch));

    let r = h
        .encrypted_request_retry(RequestType::Test, &[0x5a; 16])
        .await?;
    assert_eq!(&r[..16], &[0x5a; 16]);

    // Mismatched response, reconnect, retried request
    assert_eq!(t.calls(), 3);

    Ok(())
}

#[tokio::test]
async fn retry_reconnect_failure() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    t.with_engine(|e| e.inject(Fault::Status(ResponseCode::InvalidEphemId)));

    let r = h
        .retry(&policy(3), |h| {
            let t = t.clone();
            async move {
                let r = h.encrypted_request(RequestType::GetAddresses, &[]).await;
                // Lock the device so the reconnect fails
                t.with_engine(|e| e.lock());
                r
            }
        })
        .await;

    // The recovery error is propagated
    assert!(matches!(r, Err(Error::Device(ResponseCode::DeviceLocked))));
    assert_eq!(t.calls(), 2);

    Ok(())
}
