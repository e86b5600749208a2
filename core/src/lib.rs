// Copyright (c) 2022-2023 The MobileCoin Foundation

//! KeyLink secure device core
//!
//! This provides a hardware-independent [Engine][engine::Engine] implementing the
//! device side of the KeyLink secure channel, used by the simulator and for
//! exercising host implementations without hardware.
//!
//! Interactions with the [Engine][engine::Engine] are performed via
//! [Event][engine::Event]s decoded from request frames and [Output][engine::Output]s
//! encoded to response frames, see [keylink_proto] for wire encodings.
//!
//! ## Operations
//!
//! ### Handshake
//!
//! Hosts issue a [`ConnectReq`][keylink_proto::connect::ConnectReq] containing their
//! identity public key, the engine rotates the per-host ephemeral key and returns a
//! [`ConnectResp`][keylink_proto::connect::ConnectResp] containing the new ephemeral
//! public key, firmware version, and either the encrypted active wallets (for
//! paired hosts) or a one-time pairing salt.
//!
//! ### Pairing
//!
//! Unpaired hosts sign the pairing salt and the pairing secret displayed by the
//! device (see [Driver::pairing_secret][engine::Driver::pairing_secret]) and submit
//! this via an encrypted
//! [`FinalizePairing`][keylink_proto::RequestType::FinalizePairing] request.
//!
//! ### Encrypted requests
//!
//! Each encrypted request is located by the ephemeral identifier of the shared
//! secret, decrypted, executed, and the response sealed under the same secret
//! while committing to a freshly generated ephemeral key. Error responses do not
//! rotate keys.

pub use keylink_proto::{self as proto};

pub mod engine;

pub mod helpers;
