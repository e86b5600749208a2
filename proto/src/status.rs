// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device response codes
//!

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

/// Result code carried as the first byte of every response payload
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, EnumString, Display, EnumIter, TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0x00,
    InvalidMsg = 0x80,
    UnsupportedVersion = 0x81,
    DeviceBusy = 0x82,
    UserTimeout = 0x83,
    UserDeclined = 0x84,
    PairFailed = 0x85,
    PairDisabled = 0x86,
    PermissionDisabled = 0x87,
    InternalError = 0x88,
    GceTimeout = 0x89,
    WrongWallet = 0x8a,
    DeviceLocked = 0x8b,
    Disabled = 0x8c,
    Already = 0x8d,
    InvalidEphemId = 0x8e,
}

impl ResponseCode {
    /// Human readable message for this response code
    pub const fn message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "",
            ResponseCode::InvalidMsg => "Invalid Request",
            ResponseCode::UnsupportedVersion => "Unsupported Version",
            ResponseCode::DeviceBusy => "Device Busy",
            ResponseCode::UserTimeout => "Timeout waiting for user",
            ResponseCode::UserDeclined => "Request declined by user",
            ResponseCode::PairFailed => "Pairing failed",
            ResponseCode::PairDisabled => "Pairing is currently disabled",
            ResponseCode::PermissionDisabled => "Automated signing is currently disabled",
            ResponseCode::InternalError => "Device Error",
            ResponseCode::GceTimeout => "Device Timeout",
            ResponseCode::WrongWallet => "Active wallet does not match request",
            ResponseCode::DeviceLocked => "Device Locked",
            ResponseCode::Disabled => "Feature Disabled",
            ResponseCode::Already => "Record already exists on device",
            ResponseCode::InvalidEphemId => "Request failed - needs resync",
        }
    }

    /// Fetch the wire byte for this response code
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Decode a response code byte, mapping unknown codes to [ResponseCode::InvalidMsg]
    pub fn from_byte(b: u8) -> Self {
        Self::try_from(b).unwrap_or(ResponseCode::InvalidMsg)
    }

    /// Check whether this code requires user interaction to resolve,
    /// these are terminal and never retried automatically
    pub const fn is_user_terminal(&self) -> bool {
        matches!(self, ResponseCode::UserDeclined | ResponseCode::UserTimeout)
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn response_code_bytes() {
        for c in ResponseCode::iter() {
            assert_eq!(ResponseCode::from_byte(c as u8), c);
        }

        assert_eq!(ResponseCode::from_byte(0x42), ResponseCode::InvalidMsg);
    }

    #[test]
    fn messages() {
        for c in ResponseCode::iter().filter(|c| *c != ResponseCode::Success) {
            assert!(!c.message().is_empty(), "missing message for {c}");
        }
    }

    #[test]
    fn user_terminal() {
        let terminal: Vec<_> = ResponseCode::iter().filter(|c| c.is_user_terminal()).collect();
        assert_eq!(
            terminal,
            &[ResponseCode::UserTimeout, ResponseCode::UserDeclined]
        );
    }
}
