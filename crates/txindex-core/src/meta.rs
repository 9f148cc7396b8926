//! Persisted record values: the tip marker, transaction records and index flags.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::indexer::IndexKind;
use crate::types::{Coin, Hash256, OutPoint, Transaction};

// ─── BlockMeta ────────────────────────────────────────────────────────────────

/// A compact `(height, hash)` marker: what block the index is caught up to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub height: u32,
    pub hash: Hash256,
}

impl BlockMeta {
    /// Encoded size: 32-byte hash followed by a little-endian `u32` height.
    pub const SIZE: usize = 36;

    /// The tip of an index that has not indexed anything yet.
    pub const ZERO: BlockMeta = BlockMeta {
        height: 0,
        hash: Hash256::ZERO,
    };

    pub fn new(height: u32, hash: Hash256) -> Self {
        Self { height, hash }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexerError> {
        if bytes.len() != Self::SIZE {
            return Err(IndexerError::Codec(format!(
                "block meta must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let hash = Hash256::from_slice(&bytes[..32])
            .ok_or_else(|| IndexerError::Codec("block meta hash".into()))?;
        let mut height = [0u8; 4];
        height.copy_from_slice(&bytes[32..]);
        Ok(Self {
            height: u32::from_le_bytes(height),
            hash,
        })
    }
}

impl std::fmt::Display for BlockMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}

// ─── TxMeta ───────────────────────────────────────────────────────────────────

/// A transaction record: the transaction plus where it was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    pub tx: Transaction,
    pub block_hash: Hash256,
    pub height: u32,
    /// Position of the transaction within its block.
    pub index: u32,
    /// Timestamp of the containing block.
    pub block_time: i64,
    /// When the record was written (seconds since epoch).
    pub mtime: i64,
}

impl TxMeta {
    pub fn new(tx: Transaction, block: &BlockMeta, block_time: i64, index: u32) -> Self {
        Self {
            tx,
            block_hash: block.hash,
            height: block.height,
            index,
            block_time,
            mtime: chrono::Utc::now().timestamp(),
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.tx.hash
    }

    /// Output `index` of this transaction as a coin, if it exists.
    pub fn coin(&self, index: u32) -> Option<Coin> {
        let output = self.tx.outputs.get(index as usize)?;
        Some(Coin {
            outpoint: OutPoint::new(self.tx.hash, index),
            value: output.value,
            address: output.address.clone(),
            height: self.height,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, IndexerError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| IndexerError::Codec(format!("encode tx meta: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexerError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| IndexerError::Codec(format!("decode tx meta: {e}")))?;
        Ok(meta)
    }
}

// ─── IndexFlags ───────────────────────────────────────────────────────────────

/// The `O` record: which network and which indexes a store was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFlags {
    pub magic: u32,
    pub tx: bool,
    pub address: bool,
}

impl IndexFlags {
    const TX_BIT: u8 = 0b01;
    const ADDRESS_BIT: u8 = 0b10;

    pub fn new(magic: u32, indexers: &[IndexKind]) -> Self {
        Self {
            magic,
            tx: indexers.contains(&IndexKind::Tx),
            address: indexers.contains(&IndexKind::Address),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bits = 0u8;
        if self.tx {
            bits |= Self::TX_BIT;
        }
        if self.address {
            bits |= Self::ADDRESS_BIT;
        }
        let mut out = self.magic.to_le_bytes().to_vec();
        out.push(bits);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexerError> {
        if bytes.len() != 5 {
            return Err(IndexerError::Codec(format!(
                "index flags must be 5 bytes, got {}",
                bytes.len()
            )));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        Ok(Self {
            magic: u32::from_le_bytes(magic),
            tx: bytes[4] & Self::TX_BIT != 0,
            address: bytes[4] & Self::ADDRESS_BIT != 0,
        })
    }

    /// Check a stored record against the configured one.
    pub fn verify(&self, stored: &IndexFlags) -> Result<(), IndexerError> {
        if stored.magic != self.magic {
            return Err(IndexerError::NetworkMismatch {
                expected: self.magic,
                found: stored.magic,
            });
        }
        if stored.tx != self.tx || stored.address != self.address {
            return Err(IndexerError::FlagsMismatch {
                expected: self.describe(),
                found: stored.describe(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tx={} address={}", self.tx, self.address)
    }
}
