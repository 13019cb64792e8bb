//! Core types for giver mining
//!
//! Network selection, TON account addresses, and the proof-of-work challenge
//! parameters returned by the indexing API.

use crate::utils::crc16_xmodem;
use crate::{Error, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Testnet giver accepting mined proof-of-work messages
pub const TESTNET_GIVER: &str = "EQDe1EaGTLsqY5K_lQcqViPXxBg6ANjlZ3v4PxzaQkolOqW8";

/// Target TON network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Indexing API base URL (tonapi.io)
    pub fn tonapi_base(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://tonapi.io/v2",
            Network::Testnet => "https://testnet.tonapi.io/v2",
        }
    }

    /// JSON-RPC endpoint (toncenter)
    pub fn rpc_endpoint(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://toncenter.com/api/v2/jsonRPC",
            Network::Testnet => "https://testnet.toncenter.com/api/v2/jsonRPC",
        }
    }

    /// Built-in giver address, if the network ships one
    pub fn default_giver(&self) -> Option<&'static str> {
        match self {
            // Mainnet givers rotate; the operator must configure one.
            Network::Mainnet => None,
            Network::Testnet => Some(TESTNET_GIVER),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// TON account address: workchain plus a 256-bit account id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountAddress {
    workchain: i8,
    hash: [u8; 32],
}

impl AccountAddress {
    /// Create from parts
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Workchain id
    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    /// 256-bit account id
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Raw form, `workchain:hex`
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// User-friendly base64url form with a crc16 trailer
    pub fn to_friendly(&self, bounceable: bool, testnet_only: bool) -> String {
        let mut tag: u8 = if bounceable { 0x11 } else { 0x51 };
        if testnet_only {
            tag |= 0x80;
        }
        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16_xmodem(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn parse_raw(s: &str) -> Result<Self> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| Error::config(format!("invalid raw address: {}", s)))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|e| Error::config(format!("invalid workchain in address: {}", e)))?;
        let bytes = hex::decode(hash_hex)
            .map_err(|e| Error::config(format!("invalid hex in address: {}", e)))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::config("address hash must be 32 bytes"))?;
        Ok(Self { workchain, hash })
    }

    fn parse_friendly(s: &str) -> Result<Self> {
        let normalized = s.replace('-', "+").replace('_', "/");
        let bytes = STANDARD
            .decode(&normalized)
            .map_err(|e| Error::config(format!("invalid base64 address: {}", e)))?;
        if bytes.len() != 36 {
            return Err(Error::config(format!(
                "invalid address length: expected 36 bytes, got {}",
                bytes.len()
            )));
        }

        let tag = bytes[0] & 0x7f;
        if tag != 0x11 && tag != 0x51 {
            return Err(Error::config(format!("unknown address tag: {:#04x}", tag)));
        }

        let expected = crc16_xmodem(&bytes[..34]);
        let stored = u16::from_be_bytes([bytes[34], bytes[35]]);
        if expected != stored {
            return Err(Error::config("address checksum mismatch"));
        }

        let workchain = bytes[1] as i8;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self { workchain, hash })
    }
}

impl FromStr for AccountAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// One entry of the giver's `get_pow_params` result stack
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengeParameter {
    /// Stack entry discriminator; only `"num"` entries carry a value
    #[serde(rename = "type")]
    pub kind: String,
    /// Numeric value, decimal or 0x-prefixed hex, possibly beyond 64 bits
    #[serde(default)]
    pub num: Option<String>,
}

impl ChallengeParameter {
    /// Whether this entry carries a numeric value
    pub fn is_numeric(&self) -> bool {
        self.kind == "num"
    }

    /// Parse the numeric value as an arbitrary-precision integer
    pub fn value(&self) -> Result<BigInt> {
        let raw = self
            .num
            .as_deref()
            .ok_or_else(|| Error::params("numeric stack entry without a value"))?;
        parse_bigint(raw)
            .ok_or_else(|| Error::params(format!("unparseable stack value: {}", raw)))
    }
}

fn parse_bigint(raw: &str) -> Option<BigInt> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let value = if let Some(hex_digits) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        BigInt::parse_bytes(hex_digits.as_bytes(), 16)?
    } else {
        BigInt::parse_bytes(digits.as_bytes(), 10)?
    };
    Some(if negative { -value } else { value })
}

/// The ordered result stack of `get_pow_params`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChallengeParameterSet(pub Vec<ChallengeParameter>);

impl ChallengeParameterSet {
    /// Decimal solver arguments, in stack order.
    ///
    /// The last stack entry is always dropped: the giver getter returns a
    /// trailing entry the solver does not take. Non-numeric entries are
    /// skipped. Do not change the drop-last rule without confirming the
    /// indexing API contract.
    pub fn solver_args(&self) -> Result<Vec<String>> {
        let take = self.0.len().saturating_sub(1);
        self.0[..take]
            .iter()
            .filter(|p| p.is_numeric())
            .map(|p| p.value().map(|v| v.to_string()))
            .collect()
    }

    /// Space-delimited rendering of [`solver_args`](Self::solver_args), one
    /// trailing space per argument
    pub fn render(&self) -> Result<String> {
        Ok(self
            .solver_args()?
            .into_iter()
            .map(|a| format!("{} ", a))
            .collect())
    }

    /// Number of stack entries as returned by the API
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: &str) -> ChallengeParameter {
        ChallengeParameter {
            kind: "num".to_string(),
            num: Some(v.to_string()),
        }
    }

    fn other() -> ChallengeParameter {
        ChallengeParameter {
            kind: "cell".to_string(),
            num: None,
        }
    }

    #[test]
    fn test_network_endpoints() {
        assert!(Network::Testnet.tonapi_base().contains("testnet"));
        assert!(!Network::Mainnet.tonapi_base().contains("testnet"));
        assert!(Network::Testnet.default_giver().is_some());
        assert!(Network::Mainnet.default_giver().is_none());
    }

    #[test]
    fn test_address_raw_round_trip() {
        let addr = AccountAddress::new(0, [0xab; 32]);
        let raw = addr.to_raw();
        assert_eq!(raw, format!("0:{}", "ab".repeat(32)));
        assert_eq!(AccountAddress::from_str(&raw).unwrap(), addr);

        let masterchain = AccountAddress::new(-1, [0x01; 32]);
        let parsed = AccountAddress::from_str(&masterchain.to_raw()).unwrap();
        assert_eq!(parsed.workchain(), -1);
    }

    #[test]
    fn test_address_friendly_round_trip() {
        let addr = AccountAddress::new(0, [0x42; 32]);
        for bounceable in [true, false] {
            let friendly = addr.to_friendly(bounceable, false);
            assert_eq!(friendly.len(), 48);
            assert_eq!(AccountAddress::from_str(&friendly).unwrap(), addr);
        }
    }

    #[test]
    fn test_address_friendly_prefixes() {
        let addr = AccountAddress::new(0, [0x42; 32]);
        assert!(addr.to_friendly(true, false).starts_with("EQ"));
        assert!(addr.to_friendly(false, false).starts_with("UQ"));
        assert!(addr.to_friendly(true, true).starts_with("kQ"));
    }

    #[test]
    fn test_default_testnet_giver_parses() {
        let giver = AccountAddress::from_str(TESTNET_GIVER).unwrap();
        assert_eq!(giver.workchain(), 0);
    }

    #[test]
    fn test_address_rejects_corruption() {
        let addr = AccountAddress::new(0, [0x42; 32]);
        let mut friendly = addr.to_friendly(true, false).into_bytes();
        friendly[10] = if friendly[10] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(friendly).unwrap();
        assert!(AccountAddress::from_str(&corrupted).is_err());

        assert!(AccountAddress::from_str("0:deadbeef").is_err());
        assert!(AccountAddress::from_str("not an address").is_err());
    }

    #[test]
    fn test_parameter_values() {
        assert_eq!(num("123").value().unwrap(), BigInt::from(123));
        assert_eq!(num("0x7b").value().unwrap(), BigInt::from(123));
        assert_eq!(num("-0x7b").value().unwrap(), BigInt::from(-123));
        assert!(num("garbage").value().is_err());
        assert!(other().value().is_err());

        // Values beyond 64 bits survive intact
        let big = num("0x10000000000000000");
        assert_eq!(big.value().unwrap().to_string(), "18446744073709551616");
    }

    #[test]
    fn test_solver_args_drop_last_and_skip_non_numeric() {
        let set = ChallengeParameterSet(vec![num("1"), num("2"), other(), num("9")]);
        assert_eq!(set.solver_args().unwrap(), vec!["1", "2"]);
        assert_eq!(set.render().unwrap(), "1 2 ");
    }

    #[test]
    fn test_solver_args_edge_cases() {
        assert!(ChallengeParameterSet::default().solver_args().unwrap().is_empty());

        // A single entry is the final entry: always dropped.
        let set = ChallengeParameterSet(vec![num("7")]);
        assert!(set.solver_args().unwrap().is_empty());

        // Hex values render as decimal.
        let set = ChallengeParameterSet(vec![num("0xff"), other()]);
        assert_eq!(set.solver_args().unwrap(), vec!["255"]);
    }

    #[test]
    fn test_malformed_numeric_entry_fails() {
        let bad = ChallengeParameter {
            kind: "num".to_string(),
            num: None,
        };
        let set = ChallengeParameterSet(vec![bad, num("1")]);
        assert!(set.solver_args().is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_address_friendly_round_trips(hash in proptest::array::uniform32(0u8..)) {
            let addr = AccountAddress::new(0, hash);
            for bounceable in [false, true] {
                let friendly = addr.to_friendly(bounceable, false);
                let parsed = AccountAddress::from_str(&friendly).unwrap();
                proptest::prop_assert_eq!(parsed, addr);
            }
        }

        #[test]
        fn prop_render_is_args_joined_with_trailing_space(values in proptest::collection::vec(0u64..u64::MAX, 0..8)) {
            let mut entries: Vec<ChallengeParameter> =
                values.iter().map(|v| num(&v.to_string())).collect();
            entries.push(num("0"));
            let set = ChallengeParameterSet(entries);

            let args = set.solver_args().unwrap();
            let expected: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            proptest::prop_assert_eq!(&args, &expected);

            let rendered = set.render().unwrap();
            let joined: String = args.iter().map(|a| format!("{} ", a)).collect();
            proptest::prop_assert_eq!(rendered, joined);
        }
    }
}
