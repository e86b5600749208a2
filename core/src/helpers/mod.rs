// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Engine helpers

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use keylink_proto::connect::FW_VERSION_LEN;

use crate::engine::Driver;

/// Seed-based [Driver] implementation, for simulator and test use
pub struct SeedDriver {
    seed: [u8; 32],
    fw_version: [u8; FW_VERSION_LEN],
    pairing_secret: Vec<u8>,
}

impl SeedDriver {
    /// Create a new driver with the provided seed, firmware version
    /// (`[fix, minor, major, reserved]`) and pairing secret
    pub fn new(seed: [u8; 32], fw_version: [u8; FW_VERSION_LEN], pairing_secret: &[u8]) -> Self {
        Self {
            seed,
            fw_version,
            pairing_secret: pairing_secret.to_vec(),
        }
    }
}

impl Driver for SeedDriver {
    fn fw_version(&self) -> [u8; FW_VERSION_LEN] {
        self.fw_version
    }

    fn pairing_secret(&self) -> &[u8] {
        &self.pairing_secret
    }

    fn derive(&self, info: &[u8]) -> [u8; 32] {
        let mut k = [0u8; 32];
        k.copy_from_slice(&Sha256::new().chain_update(self.seed).chain_update(info).finalize());
        k
    }
}

impl Drop for SeedDriver {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn derive_deterministic() {
        let a = SeedDriver::new([1; 32], [0; 4], b"");
        let b = SeedDriver::new([2; 32], [0; 4], b"");

        assert_eq!(a.derive(b"ctx"), a.derive(b"ctx"));
        assert_ne!(a.derive(b"ctx"), a.derive(b"other"));
        assert_ne!(a.derive(b"ctx"), b.derive(b"ctx"));
    }
}
