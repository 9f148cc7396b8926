//! Chain network identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{ChainEntry, Hash256};

/// The chain network an index is built for.
///
/// The network's magic is persisted on first open and checked on every
/// later open, so a store can never be silently reused across networks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Testnet,
    Regtest,
    Simnet,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Main,
        Network::Testnet,
        Network::Regtest,
        Network::Simnet,
    ];

    /// Network magic (message-start bytes read as little-endian `u32`).
    pub fn magic(self) -> u32 {
        match self {
            Self::Main => 0xd9b4_bef9,
            Self::Testnet => 0x0709_110b,
            Self::Regtest => 0xdab5_bffa,
            Self::Simnet => 0x1214_1c16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
            Self::Simnet => "simnet",
        }
    }

    /// Look up a network by its magic.
    pub fn from_magic(magic: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.magic() == magic)
    }

    /// Genesis timestamp (seconds since epoch).
    pub fn genesis_time(self) -> i64 {
        match self {
            Self::Main => 1_231_006_505,
            Self::Testnet => 1_296_688_602,
            Self::Regtest | Self::Simnet => 1_296_688_602,
        }
    }

    /// Deterministic genesis hash for this network.
    pub fn genesis_hash(self) -> Hash256 {
        let mut seed = b"txindex-genesis".to_vec();
        seed.extend_from_slice(&self.magic().to_le_bytes());
        Hash256::digest(&seed)
    }

    /// The genesis entry every chain source for this network starts from.
    pub fn genesis(self) -> ChainEntry {
        ChainEntry {
            height: 0,
            hash: self.genesis_hash(),
            prev_hash: Hash256::ZERO,
            time: self.genesis_time(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            "simnet" => Ok(Self::Simnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_are_distinct() {
        for a in Network::ALL {
            for b in Network::ALL {
                if a != b {
                    assert_ne!(a.magic(), b.magic());
                    assert_ne!(a.genesis_hash(), b.genesis_hash());
                }
            }
        }
    }

    #[test]
    fn from_magic_roundtrip() {
        for n in Network::ALL {
            assert_eq!(Network::from_magic(n.magic()), Some(n));
        }
        assert_eq!(Network::from_magic(0xdead_beef), None);
    }

    #[test]
    fn parse_names() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Main);
        assert_eq!("Regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert!("litecoin".parse::<Network>().is_err());
    }

    #[test]
    fn genesis_entry_is_height_zero() {
        let g = Network::Testnet.genesis();
        assert_eq!(g.height, 0);
        assert_eq!(g.prev_hash, Hash256::ZERO);
        assert_eq!(g.hash, Network::Testnet.genesis_hash());
    }
}
