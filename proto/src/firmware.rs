// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Firmware versions and capability resolution
//!
//! Device capabilities are derived from the firmware version reported in the
//! handshake by folding an ordered table of version-gated [RULES] over a base
//! capability set. Rules may shrink values set by earlier rules, so ordering
//! is significant.

use bitflags::bitflags;

use crate::{ProtoError, RequestType, REQUEST_DATA_CAPACITY};

/// Firmware version, ordered by `major`, `minor` then `fix`
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FwVersion {
    pub major: u8,
    pub minor: u8,
    pub fix: u8,
}

impl FwVersion {
    /// Create a new firmware version
    pub const fn new(major: u8, minor: u8, fix: u8) -> Self {
        Self { major, minor, fix }
    }

    /// Parse a raw `[fix, minor, major]` version, returning `None` for legacy
    /// firmware (empty or all-zero versions)
    pub fn parse(raw: &[u8]) -> Result<Option<Self>, ProtoError> {
        match raw {
            [] | [0, 0, 0] => Ok(None),
            [fix, minor, major] => Ok(Some(Self::new(*major, *minor, *fix))),
            _ => Err(ProtoError::InvalidFirmware(raw.len())),
        }
    }

    /// Encode to the raw `[fix, minor, major]` form
    pub fn to_raw(&self) -> [u8; 3] {
        [self.fix, self.minor, self.major]
    }
}

impl core::fmt::Display for FwVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.fix)
    }
}

bitflags! {
    /// Bitcoin address types supported for derivation
    pub struct BtcAddrTypes: u8 {
        const LEGACY = 1 << 0;
        const SEGWIT = 1 << 1;
    }
}

bitflags! {
    /// Hash functions available for generic signing
    pub struct HashTypes: u8 {
        const NONE = 1 << 0;
        const KECCAK256 = 1 << 1;
        const SHA256 = 1 << 2;
    }
}

bitflags! {
    /// Curves available for generic signing
    pub struct CurveTypes: u8 {
        const SECP256K1 = 1 << 0;
        const ED25519 = 1 << 1;
        const BLS12_381_G2 = 1 << 2;
    }
}

bitflags! {
    /// Payload encodings understood by generic signing
    pub struct EncodingTypes: u8 {
        const NONE = 1 << 0;
        const SOLANA = 1 << 1;
        const TERRA = 1 << 2;
        const EVM = 1 << 3;
        const ETH_DEPOSIT = 1 << 4;
    }
}

bitflags! {
    /// Address derivation flags
    pub struct AddrFlags: u8 {
        const SECP256K1_PUB = 1 << 0;
        const ED25519_PUB = 1 << 1;
        const BLS12_381_G1_PUB = 1 << 2;
    }
}

/// Key-value record limits
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct KvLimits {
    pub key_max_str_sz: usize,
    pub val_max_str_sz: usize,
    pub add_max: usize,
    pub remove_max: usize,
}

/// Extra data frame limits for requests spanning multiple frames
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ExtraDataLimits {
    pub frame_sz: usize,
    pub max_frames: usize,
}

/// ABI definition limits
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AbiLimits {
    pub category_sz: usize,
    pub max_rmv: usize,
}

/// Generic signing parameters
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct GenericSigning {
    pub base_req_sz: usize,
    pub base_data_sz: usize,
    pub hash_types: HashTypes,
    pub curve_types: CurveTypes,
    pub encoding_types: EncodingTypes,
}

/// Calldata decoding parameters
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CalldataDecoding {
    pub reserved: usize,
    pub max_sz: usize,
}

/// Capabilities resolved from a firmware version
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FwCapabilities {
    /// Maximum signing request data size
    pub req_max_data_sz: usize,
    pub eth_max_gas_price: u64,
    pub flexible_addr_paths: bool,
    pub eth_max_data_sz: usize,
    pub eth_max_msg_sz: usize,
    pub eip712_max_type_params: usize,
    pub var_addr_path_sz_allowed: bool,
    pub eip712_supported: bool,
    pub prehash_allowed: bool,
    pub eth_msg_prehash_allowed: bool,
    pub allowed_eth_tx_types: Vec<u8>,
    pub personal_sign_header_sz: usize,
    pub kv_records: Option<KvLimits>,
    pub extra_data: Option<ExtraDataLimits>,
    pub btc_addr_types: BtcAddrTypes,
    pub abi: Option<AbiLimits>,
    pub generic_signing: Option<GenericSigning>,
    pub addr_flags: AddrFlags,
    pub calldata_decoding: Option<CalldataDecoding>,
}

/// Reserved request space for ETH transaction metadata
const ETH_DATA_RESERVED: usize = 128;

impl Default for FwCapabilities {
    /// Base (legacy) capabilities
    fn default() -> Self {
        let req_max_data_sz = 1152;
        let eth_max_data_sz = req_max_data_sz - ETH_DATA_RESERVED;

        Self {
            req_max_data_sz,
            eth_max_gas_price: 500_000_000_000,
            flexible_addr_paths: false,
            eth_max_data_sz,
            eth_max_msg_sz: eth_max_data_sz,
            eip712_max_type_params: 18,
            var_addr_path_sz_allowed: false,
            eip712_supported: false,
            prehash_allowed: false,
            eth_msg_prehash_allowed: false,
            allowed_eth_tx_types: vec![],
            personal_sign_header_sz: 0,
            kv_records: None,
            extra_data: None,
            btc_addr_types: BtcAddrTypes::empty(),
            abi: None,
            generic_signing: None,
            addr_flags: AddrFlags::empty(),
            calldata_decoding: None,
        }
    }
}

/// Capability patch applied for firmware at or above a given version
pub type Rule = (FwVersion, fn(FwCapabilities) -> FwCapabilities);

/// Version-gated capability rules, in strictly ascending version order
pub const RULES: &[Rule] = &[
    (FwVersion::new(0, 10, 0), |c: FwCapabilities| {
        let req_max_data_sz = 1678;
        let eth_max_data_sz = req_max_data_sz - ETH_DATA_RESERVED;
        FwCapabilities {
            req_max_data_sz,
            eth_max_gas_price: 20_000_000_000_000,
            flexible_addr_paths: true,
            eth_max_data_sz,
            eth_max_msg_sz: eth_max_data_sz,
            ..c
        }
    }),
    (FwVersion::new(0, 10, 5), |c: FwCapabilities| FwCapabilities {
        var_addr_path_sz_allowed: true,
        eip712_supported: true,
        ..c
    }),
    (FwVersion::new(0, 10, 8), |c: FwCapabilities| FwCapabilities {
        prehash_allowed: true,
        ..c
    }),
    (FwVersion::new(0, 10, 10), |c: FwCapabilities| FwCapabilities {
        eth_msg_prehash_allowed: true,
        ..c
    }),
    (FwVersion::new(0, 11, 0), |c: FwCapabilities| {
        // Typed transactions carry extra metadata, shrinking the data limit
        let eth_max_data_sz = c.eth_max_data_sz - 10;
        FwCapabilities {
            allowed_eth_tx_types: vec![1, 2],
            eth_max_data_sz,
            eth_max_msg_sz: eth_max_data_sz,
            ..c
        }
    }),
    (FwVersion::new(0, 11, 2), |c: FwCapabilities| FwCapabilities {
        personal_sign_header_sz: 72,
        ..c
    }),
    (FwVersion::new(0, 11, 5), |c: FwCapabilities| FwCapabilities {
        kv_records: Some(KvLimits {
            key_max_str_sz: 63,
            val_max_str_sz: 63,
            add_max: 10,
            remove_max: 100,
        }),
        ..c
    }),
    (FwVersion::new(0, 12, 0), |c: FwCapabilities| FwCapabilities {
        extra_data: Some(ExtraDataLimits {
            frame_sz: 1500,
            max_frames: 1,
        }),
        ..c
    }),
    (FwVersion::new(0, 13, 0), |c: FwCapabilities| FwCapabilities {
        btc_addr_types: BtcAddrTypes::LEGACY | BtcAddrTypes::SEGWIT,
        abi: Some(AbiLimits {
            category_sz: 32,
            max_rmv: 200,
        }),
        generic_signing: Some(GenericSigning {
            base_req_sz: 1552,
            base_data_sz: 1519,
            hash_types: HashTypes::NONE | HashTypes::KECCAK256 | HashTypes::SHA256,
            curve_types: CurveTypes::SECP256K1 | CurveTypes::ED25519,
            encoding_types: EncodingTypes::NONE | EncodingTypes::SOLANA,
        }),
        addr_flags: AddrFlags::SECP256K1_PUB | AddrFlags::ED25519_PUB,
        eip712_max_type_params: 36,
        ..c
    }),
    (FwVersion::new(0, 14, 0), |mut c: FwCapabilities| {
        if let Some(g) = c.generic_signing.as_mut() {
            g.encoding_types |= EncodingTypes::TERRA;
        }
        c
    }),
    (FwVersion::new(0, 15, 0), |mut c: FwCapabilities| {
        if let Some(g) = c.generic_signing.as_mut() {
            g.encoding_types |= EncodingTypes::EVM;
        }
        c.calldata_decoding = Some(CalldataDecoding {
            reserved: 2895728,
            max_sz: 1024,
        });
        c
    }),
    (FwVersion::new(0, 17, 0), |mut c: FwCapabilities| {
        if let Some(g) = c.generic_signing.as_mut() {
            g.curve_types |= CurveTypes::BLS12_381_G2;
            g.encoding_types |= EncodingTypes::ETH_DEPOSIT;
        }
        c.addr_flags |= AddrFlags::BLS12_381_G1_PUB;
        c
    }),
];

impl FwCapabilities {
    /// Resolve capabilities from a raw `[fix, minor, major]` firmware version
    pub fn resolve(raw: &[u8]) -> Result<Self, ProtoError> {
        let v = FwVersion::parse(raw)?;
        Ok(Self::for_version(v))
    }

    /// Resolve capabilities for a parsed version (`None` for legacy firmware)
    pub fn for_version(version: Option<FwVersion>) -> Self {
        let base = Self::default();

        let v = match version {
            Some(v) => v,
            None => return base,
        };

        RULES
            .iter()
            .take_while(|(min, _)| v >= *min)
            .fold(base, |c, (_, patch)| patch(c))
    }

    /// Check whether key-value record operations are supported
    pub fn kv_allowed(&self) -> bool {
        self.kv_records.is_some()
    }

    /// Fetch the maximum request data size for an operation,
    /// returning `None` where the operation is unsupported
    pub fn max_request_size(&self, op: RequestType) -> Option<usize> {
        match op {
            RequestType::Sign => Some(self.req_max_data_sz),
            _ if op.is_kv() && !self.kv_allowed() => None,
            _ => Some(REQUEST_DATA_CAPACITY),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rules_ascending() {
        for w in RULES.windows(2) {
            assert!(w[0].0 < w[1].0, "rule {} out of order", w[1].0);
        }
    }

    #[test]
    fn version_ordering() {
        assert!(FwVersion::new(0, 10, 10) > FwVersion::new(0, 10, 8));
        assert!(FwVersion::new(1, 0, 0) > FwVersion::new(0, 17, 9));
        assert!(FwVersion::new(0, 11, 0) > FwVersion::new(0, 10, 255));
    }

    #[test]
    fn parse_versions() {
        assert_eq!(FwVersion::parse(&[]), Ok(None));
        assert_eq!(FwVersion::parse(&[0, 0, 0]), Ok(None));
        assert_eq!(
            FwVersion::parse(&[4, 10, 0]),
            Ok(Some(FwVersion::new(0, 10, 4)))
        );
        assert_eq!(FwVersion::parse(&[1, 2]), Err(ProtoError::InvalidFirmware(2)));
        assert_eq!(
            FwVersion::parse(&[1, 2, 3, 4]),
            Err(ProtoError::InvalidFirmware(4))
        );
        assert_eq!(FwVersion::new(1, 2, 3).to_raw(), [3, 2, 1]);
    }

    #[test]
    fn legacy_capabilities() {
        let c = FwCapabilities::resolve(&[]).unwrap();

        assert_eq!(c.req_max_data_sz, 1152);
        assert_eq!(c.eth_max_gas_price, 500_000_000_000);
        assert!(!c.flexible_addr_paths);
        assert_eq!(c.eth_max_data_sz, 1024);
        assert_eq!(c.eth_max_msg_sz, 1024);
        assert_eq!(c.eip712_max_type_params, 18);
        assert!(!c.kv_allowed());
    }

    #[test]
    fn capabilities_0_10_4() {
        let c = FwCapabilities::resolve(&[4, 10, 0]).unwrap();

        assert_eq!(c.req_max_data_sz, 1678);
        assert_eq!(c.eth_max_gas_price, 20_000_000_000_000);
        assert!(c.flexible_addr_paths);
        assert_eq!(c.eth_max_data_sz, 1550);

        // 0.10.5 features not yet available
        assert!(!c.eip712_supported);
        assert!(!c.var_addr_path_sz_allowed);
    }

    #[test]
    fn capabilities_shrink() {
        let before = FwCapabilities::resolve(&[10, 10, 0]).unwrap();
        let after = FwCapabilities::resolve(&[0, 11, 0]).unwrap();

        assert_eq!(before.eth_max_data_sz, 1550);
        assert_eq!(after.eth_max_data_sz, 1540);
        assert_eq!(after.eth_max_msg_sz, 1540);
        assert_eq!(after.allowed_eth_tx_types, vec![1, 2]);
    }

    #[test]
    fn capabilities_latest() {
        let c = FwCapabilities::resolve(&[0, 17, 0]).unwrap();

        assert!(c.prehash_allowed && c.eth_msg_prehash_allowed);
        assert_eq!(c.personal_sign_header_sz, 72);
        assert_eq!(c.kv_records.map(|k| k.add_max), Some(10));
        assert_eq!(c.extra_data.map(|e| e.frame_sz), Some(1500));
        assert_eq!(c.eip712_max_type_params, 36);
        assert!(c.addr_flags.contains(AddrFlags::BLS12_381_G1_PUB));

        let g = c.generic_signing.unwrap();
        assert_eq!(g.base_req_sz, 1552);
        assert!(g.curve_types.contains(CurveTypes::BLS12_381_G2));
        assert_eq!(g.encoding_types, EncodingTypes::all());

        // 0.16 sits between rules and matches 0.15
        let c16 = FwCapabilities::resolve(&[3, 16, 0]).unwrap();
        assert!(!c16.addr_flags.contains(AddrFlags::BLS12_381_G1_PUB));
        assert_eq!(c16.calldata_decoding.map(|d| d.max_sz), Some(1024));
    }

    #[test]
    fn resolution_deterministic() {
        for raw in [&[0u8; 0][..], &[4, 10, 0], &[0, 13, 0], &[9, 9, 9]] {
            assert_eq!(
                FwCapabilities::resolve(raw).unwrap(),
                FwCapabilities::resolve(raw).unwrap()
            );
        }
    }

    #[test]
    fn request_limits() {
        let legacy = FwCapabilities::resolve(&[]).unwrap();
        assert_eq!(legacy.max_request_size(RequestType::Sign), Some(1152));
        assert_eq!(legacy.max_request_size(RequestType::AddKvRecords), None);
        assert_eq!(legacy.max_request_size(RequestType::GetAddresses), Some(1723));

        let c = FwCapabilities::resolve(&[5, 11, 0]).unwrap();
        assert_eq!(c.max_request_size(RequestType::Sign), Some(1678));
        assert_eq!(c.max_request_size(RequestType::GetKvRecords), Some(1723));
    }
}
