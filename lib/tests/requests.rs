// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use keylink::{
    proto::REQUEST_DATA_CAPACITY, DeviceHandle, Error, PairingStatus, RequestType, ResponseCode,
    Transport,
};
use keylink_core::engine::Fault;

mod helpers;
use helpers::*;

#[tokio::test]
async fn request_before_connect() -> anyhow::Result<()> {
    setup_logging();

    let t = SimTransport::new(engine(FW_CURRENT));
    let h = DeviceHandle::new(t.clone(), config());

    let r = h.encrypted_request(RequestType::GetWallets, &[]).await;
    assert!(matches!(r, Err(Error::MustReconnect)));

    let r = h.fetch_active_wallets().await;
    assert!(matches!(r, Err(Error::MustReconnect)));

    assert_eq!(t.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn request_before_pairing() -> anyhow::Result<()> {
    setup_logging();

    let t = SimTransport::new(engine(FW_CURRENT));
    let h = DeviceHandle::new(t.clone(), config());

    h.connect(DEVICE_ID).await?;
    t.reset_calls();

    let r = h.encrypted_request(RequestType::GetAddresses, &[0u8; 4]).await;
    assert!(matches!(
        r,
        Err(Error::InvalidState {
            actual: PairingStatus::PairingPending,
            expected: PairingStatus::Paired,
        })
    ));
    assert_eq!(t.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn request_rotates_keys() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    let s0 = h.state().await;
    let id0 = s0.ephemeral_id();

    // Ephemeral id is a pure function of the shared secret
    assert_eq!(id0, h.state().await.ephemeral_id());

    let a = h.encrypted_request(RequestType::GetAddresses, &[0u8; 4]).await?;
    assert_eq!(a.len(), RequestType::GetAddresses.response_len());

    let s1 = h.state().await;
    assert_ne!(s1.peer_key(), s0.peer_key());
    assert_ne!(s1.ephemeral_id(), id0);

    // Host and device remain in sync following rotation
    let device_secret = t.with_engine(|e| e.session_secret(&s1.identity_public()));
    assert_eq!(device_secret.as_ref(), s1.shared_secret().ok());

    // Results are deterministic for the same request
    let b = h.encrypted_request(RequestType::GetAddresses, &[0u8; 4]).await?;
    assert_eq!(a, b);

    let c = h.encrypted_request(RequestType::GetAddresses, &[1u8; 4]).await?;
    assert_ne!(a, c);

    assert_eq!(t.calls(), 3);

    Ok(())
}

#[tokio::test]
async fn request_result_trimmed() -> anyhow::Result<()> {
    let (_t, h) = paired(FW_CURRENT).await;

    let data = [0xabu8; 32];
    let r = h.encrypted_request(RequestType::Test, &data).await?;

    assert_eq!(r.len(), RequestType::Test.response_len());
    assert_eq!(&r[..data.len()], &data[..]);
    assert!(r[data.len()..].iter().all(|b| *b == 0));

    let r = h.encrypted_request(RequestType::FinalizePairing, &[]).await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::Already))));

    Ok(())
}

#[tokio::test]
async fn request_size_limits() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    let data = vec![0u8; REQUEST_DATA_CAPACITY + 1];
    let r = h.encrypted_request(RequestType::Test, &data).await;
    assert!(matches!(
        r,
        Err(Error::DataTooLarge { len, max })
            if len == REQUEST_DATA_CAPACITY + 1 && max == REQUEST_DATA_CAPACITY
    ));

    let max = h.capabilities().await.req_max_data_sz;
    let data = vec![0u8; max + 1];
    let r = h.encrypted_request(RequestType::Sign, &data).await;
    assert!(matches!(r, Err(Error::DataTooLarge { .. })));

    assert_eq!(t.calls(), 0);

    // Within limits the request reaches the device
    let data = vec![0u8; max];
    let r = h.encrypted_request(RequestType::Sign, &data).await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::Disabled))));
    assert_eq!(t.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn request_legacy_firmware() -> anyhow::Result<()> {
    let (t, h) = paired(FW_LEGACY).await;

    assert_eq!(h.state().await.firmware(), None);
    assert!(!h.capabilities().await.kv_allowed());

    for op in [
        RequestType::GetKvRecords,
        RequestType::AddKvRecords,
        RequestType::RemoveKvRecords,
    ] {
        let r = h.encrypted_request(op, &[]).await;
        assert!(matches!(r, Err(Error::Unsupported(o)) if o == op));
    }
    assert_eq!(t.calls(), 0);

    // Non-kv operations are unaffected
    h.encrypted_request(RequestType::GetAddresses, &[]).await?;

    Ok(())
}

#[tokio::test]
async fn request_resync() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    let s0 = h.state().await;

    t.with_engine(|e| e.inject(Fault::MsgIdMismatch));

    let r = h.encrypted_request(RequestType::GetWallets, &[]).await;
    assert!(matches!(r, Err(Error::Resync { .. })));

    // Session is left untouched
    let s1 = h.state().await;
    assert_eq!(s1.peer_key(), s0.peer_key());
    assert_eq!(s1.ephemeral_id(), s0.ephemeral_id());

    // The device has moved on, so the stale session is rejected
    let r = h.encrypted_request(RequestType::GetWallets, &[]).await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::InvalidEphemId))));

    // Reconnecting recovers
    assert!(h.connect(DEVICE_ID).await?);
    h.encrypted_request(RequestType::GetWallets, &[]).await?;

    Ok(())
}

#[tokio::test]
async fn request_device_error() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    let s0 = h.state().await;

    t.with_engine(|e| e.inject(Fault::Status(ResponseCode::UserDeclined)));

    let r = h.encrypted_request(RequestType::GetAddresses, &[]).await;
    let e = r.unwrap_err();
    assert_eq!(e.response_code(), Some(ResponseCode::UserDeclined));
    assert_eq!(e.to_string(), "Device error: Request declined by user (0x84)");

    // Error responses do not rotate keys
    assert_eq!(h.state().await.peer_key(), s0.peer_key());
    h.encrypted_request(RequestType::GetAddresses, &[]).await?;

    Ok(())
}

/// Transport that never responds
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn exchange(&self, _device_id: &str, _frame: &[u8]) -> Result<Vec<u8>, Error> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(Error::RequestTimeout)
    }
}

#[tokio::test]
async fn request_timeout() -> anyhow::Result<()> {
    setup_logging();

    let h = DeviceHandle::new(
        StalledTransport,
        keylink::Config {
            timeout_ms: 10,
            ..config()
        },
    );

    let r = tokio::time::timeout(Duration::from_secs(5), h.connect(DEVICE_ID)).await?;
    assert!(matches!(r, Err(Error::RequestTimeout)));

    // Timeouts leave the session untouched
    let s = h.state().await;
    assert!(s.peer_key().is_none());
    assert_eq!(s.pairing_status(), PairingStatus::Unpaired);

    Ok(())
}

/// Transport that stalls once enabled
#[derive(Clone)]
struct StallingTransport {
    inner: SimTransport,
    stall: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for StallingTransport {
    async fn exchange(&self, device_id: &str, frame: &[u8]) -> Result<Vec<u8>, Error> {
        if self.stall.load(Ordering::SeqCst) {
            return StalledTransport.exchange(device_id, frame).await;
        }
        self.inner.exchange(device_id, frame).await
    }
}

#[tokio::test]
async fn request_timeout_per_call() -> anyhow::Result<()> {
    setup_logging();

    let t = StallingTransport {
        inner: SimTransport::new(engine(FW_CURRENT)),
        stall: Arc::new(AtomicBool::new(false)),
    };

    // Configured timeout exceeds the test limit, so only per-call timeouts can fire
    let h = DeviceHandle::new(
        t.clone(),
        keylink::Config {
            timeout_ms: 60_000,
            ..config()
        },
    );
    let per_call = Duration::from_millis(10);
    let limit = Duration::from_secs(5);

    assert!(!h.connect_with_timeout(DEVICE_ID, per_call).await?);

    t.stall.store(true, Ordering::SeqCst);

    let r = tokio::time::timeout(limit, h.pair_with_timeout(PAIRING_SECRET, per_call)).await?;
    assert!(matches!(r, Err(Error::RequestTimeout)));
    assert_eq!(h.pairing_status().await, PairingStatus::PairingPending);

    let r = tokio::time::timeout(limit, h.connect_with_timeout(DEVICE_ID, per_call)).await?;
    assert!(matches!(r, Err(Error::RequestTimeout)));
    assert_eq!(h.device_id().await.as_deref(), Some(DEVICE_ID));

    Ok(())
}

#[tokio::test]
async fn concurrent_requests() -> anyhow::Result<()> {
    let (t, h) = paired(FW_CURRENT).await;

    // Overlapping requests on cloned handles are serialised
    let tasks: Vec<_> = (0..8u8)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move { h.encrypted_request(RequestType::Test, &[i; 8]).await })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let r = task.await??;
        assert_eq!(&r[..8], &[i as u8; 8]);
    }

    assert_eq!(t.calls(), 8);

    Ok(())
}
