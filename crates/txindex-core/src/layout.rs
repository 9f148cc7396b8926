//! Byte-level key schema for every record the engine persists.
//!
//! ```text
//! V                                  -> schema version
//! O                                  -> network magic + index flags
//! h                                  -> tip (BlockMeta)
//! t[hash]                            -> TxMeta
//! T[addr-len][addr][hash]            -> marker (tx touches address)
//! C[addr-len][addr][hash][index BE]  -> marker (unspent coin owned by address)
//! ```
//!
//! The address length byte makes every key self-delimiting, and big-endian
//! output indexes keep `C` entries for one transaction in output order.

use crate::error::IndexerError;
use crate::types::{AddressHash, Hash256, OutPoint};

pub const PREFIX_VERSION: u8 = b'V';
pub const PREFIX_FLAGS: u8 = b'O';
pub const PREFIX_TIP: u8 = b'h';
pub const PREFIX_TX: u8 = b't';
pub const PREFIX_ADDR_TX: u8 = b'T';
pub const PREFIX_ADDR_COIN: u8 = b'C';

/// A logical key in the index store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    Version,
    Flags,
    Tip,
    Tx(Hash256),
    AddrTx(AddressHash, Hash256),
    AddrCoin(AddressHash, OutPoint),
}

impl IndexKey {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Version => vec![PREFIX_VERSION],
            Self::Flags => vec![PREFIX_FLAGS],
            Self::Tip => vec![PREFIX_TIP],
            Self::Tx(hash) => {
                let mut key = Vec::with_capacity(1 + Hash256::LEN);
                key.push(PREFIX_TX);
                key.extend_from_slice(hash.as_bytes());
                key
            }
            Self::AddrTx(addr, hash) => {
                let mut key = address_prefix(PREFIX_ADDR_TX, addr);
                key.extend_from_slice(hash.as_bytes());
                key
            }
            Self::AddrCoin(addr, outpoint) => {
                let mut key = address_prefix(PREFIX_ADDR_COIN, addr);
                key.extend_from_slice(outpoint.hash.as_bytes());
                key.extend_from_slice(&outpoint.index.to_be_bytes());
                key
            }
        }
    }

    pub fn decode(key: &[u8]) -> Result<Self, IndexerError> {
        let (&prefix, rest) = key
            .split_first()
            .ok_or_else(|| IndexerError::Codec("empty key".into()))?;
        match prefix {
            PREFIX_VERSION | PREFIX_FLAGS | PREFIX_TIP => {
                if !rest.is_empty() {
                    return Err(bad_key(prefix, "unexpected trailing bytes"));
                }
                Ok(match prefix {
                    PREFIX_VERSION => Self::Version,
                    PREFIX_FLAGS => Self::Flags,
                    _ => Self::Tip,
                })
            }
            PREFIX_TX => Hash256::from_slice(rest)
                .map(Self::Tx)
                .ok_or_else(|| bad_key(prefix, "expected 32-byte hash")),
            PREFIX_ADDR_TX => {
                let (addr, rest) = split_address(prefix, rest)?;
                let hash = Hash256::from_slice(rest)
                    .ok_or_else(|| bad_key(prefix, "expected 32-byte hash"))?;
                Ok(Self::AddrTx(addr, hash))
            }
            PREFIX_ADDR_COIN => {
                let (addr, rest) = split_address(prefix, rest)?;
                if rest.len() != Hash256::LEN + 4 {
                    return Err(bad_key(prefix, "expected hash and output index"));
                }
                let hash = Hash256::from_slice(&rest[..Hash256::LEN])
                    .ok_or_else(|| bad_key(prefix, "expected 32-byte hash"))?;
                let mut index = [0u8; 4];
                index.copy_from_slice(&rest[Hash256::LEN..]);
                Ok(Self::AddrCoin(
                    addr,
                    OutPoint::new(hash, u32::from_be_bytes(index)),
                ))
            }
            other => Err(IndexerError::Codec(format!("unknown key prefix {other:#04x}"))),
        }
    }
}

/// Scan prefix for every `T` entry of `addr`.
pub fn addr_tx_prefix(addr: &AddressHash) -> Vec<u8> {
    address_prefix(PREFIX_ADDR_TX, addr)
}

/// Scan prefix for every `C` entry of `addr`.
pub fn addr_coin_prefix(addr: &AddressHash) -> Vec<u8> {
    address_prefix(PREFIX_ADDR_COIN, addr)
}

fn address_prefix(family: u8, addr: &AddressHash) -> Vec<u8> {
    let bytes = addr.as_bytes();
    let mut key = Vec::with_capacity(2 + bytes.len() + Hash256::LEN + 4);
    key.push(family);
    // AddressHash guarantees 1..=64 bytes.
    key.push(bytes.len() as u8);
    key.extend_from_slice(bytes);
    key
}

fn split_address(prefix: u8, rest: &[u8]) -> Result<(AddressHash, &[u8]), IndexerError> {
    let (&len, rest) = rest
        .split_first()
        .ok_or_else(|| bad_key(prefix, "missing address length"))?;
    let len = len as usize;
    if rest.len() < len {
        return Err(bad_key(prefix, "truncated address"));
    }
    let addr = AddressHash::new(rest[..len].to_vec())?;
    Ok((addr, &rest[len..]))
}

fn bad_key(prefix: u8, reason: &str) -> IndexerError {
    IndexerError::Codec(format!("malformed '{}' key: {reason}", prefix as char))
}
