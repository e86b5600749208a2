// Copyright (c) 2022-2023 The MobileCoin Foundation

//! JSON envelope for frames carried over HTTP
//!
//! Requests are sent as `POST {base_url}/{device_id}` with an [HttpRequest]
//! body, the relay answers with an [HttpResponse].

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Status reported by the relay for successfully delivered frames
pub const HTTP_STATUS_OK: u16 = 200;

/// Request envelope, carrying a hex-encoded request frame
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HttpRequest {
    pub data: String,
}

impl HttpRequest {
    /// Wrap a request frame
    pub fn new(frame: &[u8]) -> Self {
        Self {
            data: hex::encode(frame),
        }
    }

    /// Fetch the decoded request frame
    pub fn frame(&self) -> Result<Vec<u8>, ProtoError> {
        hex::decode(&self.data).map_err(|_| ProtoError::InvalidEncoding)
    }
}

/// Response envelope
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Relay status, [HTTP_STATUS_OK] on delivery
    pub status: u16,
    /// Relay message, describing failures
    #[serde(default)]
    pub message: String,
    /// Hex-encoded response frame, when delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl HttpResponse {
    /// Wrap a response frame
    pub fn ok(frame: &[u8]) -> Self {
        Self {
            status: HTTP_STATUS_OK,
            message: String::new(),
            data: Some(hex::encode(frame)),
        }
    }

    /// Create a failure response with no frame
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    /// Fetch the decoded response frame if present
    pub fn frame(&self) -> Option<Result<Vec<u8>, ProtoError>> {
        self.data
            .as_ref()
            .map(|d| hex::decode(d).map_err(|_| ProtoError::InvalidEncoding))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_json() {
        let r = HttpRequest::new(&[0x01, 0x02, 0xab]);
        let s = serde_json::to_string(&r).unwrap();

        assert_eq!(s, r#"{"data":"0102ab"}"#);

        let d: HttpRequest = serde_json::from_str(&s).unwrap();
        assert_eq!(d.frame().unwrap(), vec![0x01, 0x02, 0xab]);
    }

    #[test]
    fn response_json() {
        let r: HttpResponse = serde_json::from_str(r#"{"status":200,"data":"ff00"}"#).unwrap();
        assert_eq!(r.status, HTTP_STATUS_OK);
        assert_eq!(r.frame(), Some(Ok(vec![0xff, 0x00])));

        let r: HttpResponse =
            serde_json::from_str(r#"{"status":504,"message":"device offline"}"#).unwrap();
        assert_eq!(r, HttpResponse::error(504, "device offline"));
        assert_eq!(r.frame(), None);

        let r: HttpResponse = serde_json::from_str(r#"{"status":200,"data":"zz"}"#).unwrap();
        assert_eq!(r.frame(), Some(Err(ProtoError::InvalidEncoding)));
    }
}
