// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of protocol objects
//!

pub use crate::{
    connect::{ConnectReq, ConnectResp, DevicePairing, PAIRING_SALT_LEN},
    crypto::{checksum, KeyPair, PublicKey, SharedSecret},
    encrypted::{EncryptedReq, EncryptedResp},
    firmware::{FwCapabilities, FwVersion},
    frame::{decode_frame, decode_response, encode_frame, encode_response, Frame, Response},
    pairing::{app_name_bytes, FinalizePairingReq},
    status::ResponseCode,
    wallet::{ActiveWallets, Wallet},
    MsgType, ProtoError, RequestType, SecureMsgType,
};
