// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::DecodeOwned;

use keylink_proto::{
    connect::ConnectReq, encrypted::EncryptedReq, frame::decode_frame, MsgType, SecureMsgType,
};

use super::Error;

/// [`Engine`][super::Engine] input events, decoded from request frames
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    /// Handshake request
    Connect { msg_id: u32, req: ConnectReq },

    /// Encrypted operation request
    Encrypted { msg_id: u32, req: EncryptedReq },
}

impl Event {
    /// Parse a request frame to an [Event]
    pub fn parse(frame: &[u8]) -> Result<Self, Error> {
        let f = decode_frame(frame, None, MsgType::Secure, None)?;
        let msg_id = f.header.msg_id;

        let kind = match f.payload.first() {
            Some(v) => *v,
            None => return Err(Error::UnsupportedRequest(0)),
        };

        match SecureMsgType::try_from(kind) {
            Ok(SecureMsgType::Connect) => {
                let (req, _) = ConnectReq::decode_owned(f.payload)?;
                Ok(Event::Connect { msg_id, req })
            }
            Ok(SecureMsgType::Encrypted) => {
                let (req, _) = EncryptedReq::decode_owned(f.payload)?;
                Ok(Event::Encrypted { msg_id, req })
            }
            Err(_) => Err(Error::UnsupportedRequest(kind)),
        }
    }

    /// Fetch the message identifier for this event
    pub fn msg_id(&self) -> u32 {
        match self {
            Event::Connect { msg_id, .. } | Event::Encrypted { msg_id, .. } => *msg_id,
        }
    }
}
