// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::SocketAddr;

use portpicker::pick_unused_port;

use keylink::{
    Config, DeviceHandle, Error, HttpHandle, HttpTransport, PairingStatus, RequestType,
    ResponseCode,
};
use keylink_core::engine::Fault;
use keylink_sim::{Options, Simulator, UnknownDevice, DEFAULT_PAIRING_SECRET};

mod helpers;
use helpers::*;

async fn setup(opts: Options) -> (Simulator, Config) {
    setup_logging();

    let port = pick_unused_port().expect("no free ports");
    let s = Simulator::new(opts);

    let (addr, _h) = s
        .bind(SocketAddr::from(([127, 0, 0, 1], port)))
        .await
        .expect("simulator bind failed");

    let c = Config {
        base_url: format!("http://{addr}"),
        ..config()
    };

    (s, c)
}

#[tokio::test]
async fn http_session() -> anyhow::Result<()> {
    let (s, c) = setup(Options::default()).await;

    let h = HttpHandle::http(c);

    assert!(!h.connect(DEVICE_ID).await?);
    let w = h.pair(DEFAULT_PAIRING_SECRET).await?;
    assert_eq!(w.internal.name(), "main");
    assert_eq!(h.pairing_status().await, PairingStatus::Paired);

    let a = h.encrypted_request(RequestType::GetAddresses, &[1, 2, 3, 4]).await?;
    assert_eq!(a.len(), RequestType::GetAddresses.response_len());

    // Device faults are delivered as response codes
    s.with_device(DEVICE_ID, |e| e.inject(Fault::Status(ResponseCode::DeviceBusy)));
    let r = h.encrypted_request(RequestType::GetAddresses, &[]).await;
    assert!(matches!(r, Err(Error::Device(ResponseCode::DeviceBusy))));

    // And recovered by the retry policy
    s.with_device(DEVICE_ID, |e| e.inject(Fault::ForgetSessions));
    let b = h
        .encrypted_request_retry(RequestType::GetAddresses, &[1, 2, 3, 4])
        .await?;
    assert_eq!(a, b);

    Ok(())
}

#[tokio::test]
async fn http_unknown_device() -> anyhow::Result<()> {
    let (_s, c) = setup(Options {
        unknown: UnknownDevice::Reject,
        ..Default::default()
    })
    .await;

    let h = DeviceHandle::new(HttpTransport::new(&c.base_url), c);

    let r = h.connect("missing").await;
    match r {
        Err(Error::Transport(e)) => assert!(e.to_string().contains("404")),
        _ => panic!("unexpected result: {r:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn http_unavailable() -> anyhow::Result<()> {
    setup_logging();

    let port = pick_unused_port().expect("no free ports");
    let h = HttpHandle::http(Config {
        base_url: format!("http://127.0.0.1:{port}"),
        ..config()
    });

    let r = h.connect(DEVICE_ID).await;
    assert!(matches!(r, Err(Error::Transport(_))));

    Ok(())
}
