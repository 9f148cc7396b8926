//! Shared chain types exchanged between the chain client and the engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IndexerError;
use crate::meta::BlockMeta;

// ─── Hash256 ──────────────────────────────────────────────────────────────────

/// A 32-byte block or transaction identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);
    pub const LEN: usize = 32;

    /// Double SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Parse a 64-character hex string (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self, IndexerError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| IndexerError::Codec(format!("bad hash hex: {e}")))?;
        Self::from_slice(&bytes)
            .ok_or_else(|| IndexerError::Codec(format!("hash must be 32 bytes, got {}", bytes.len())))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(&self.0[..8]))
    }
}

// ─── AddressHash ──────────────────────────────────────────────────────────────

/// The hash an output script pays to (pubkey hash, script hash, witness program).
///
/// Length is variable (1..=64 bytes) so that both 20- and 32-byte programs fit.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressHash(Vec<u8>);

impl AddressHash {
    pub const MAX_LEN: usize = 64;

    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IndexerError> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN {
            return Err(IndexerError::Codec(format!(
                "address hash must be 1..={} bytes, got {}",
                Self::MAX_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, IndexerError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| IndexerError::Codec(format!("bad address hex: {e}")))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressHash({})", hex::encode(&self.0))
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint spent by coinbase inputs.
    pub const NULL: OutPoint = OutPoint {
        hash: Hash256::ZERO,
        index: u32::MAX,
    };

    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    /// `None` for outputs whose script has no standard address (e.g. `OP_RETURN`).
    pub address: Option<AddressHash>,
}

/// A transaction as supplied by the chain source.
///
/// `raw` is the source's wire serialization and is stored verbatim; the
/// parsed inputs and outputs are what the address index is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash256,
    pub raw: Vec<u8>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a transaction whose hash is the double SHA-256 of `raw`.
    pub fn new(raw: Vec<u8>, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            hash: Hash256::digest(&raw),
            raw,
            inputs,
            outputs,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Every distinct address paid by an output of this transaction.
    pub fn output_addresses(&self) -> Vec<&AddressHash> {
        let mut out: Vec<&AddressHash> = Vec::new();
        for addr in self.outputs.iter().filter_map(|o| o.address.as_ref()) {
            if !out.contains(&addr) {
                out.push(addr);
            }
        }
        out
    }
}

// ─── Blocks & entries ─────────────────────────────────────────────────────────

/// A full block as supplied by the chain source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    /// Unix timestamp of the block (seconds since epoch).
    pub time: i64,
    pub txs: Vec<Transaction>,
}

/// A chain source's record of one block's position on its best chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub height: u32,
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub time: i64,
}

impl ChainEntry {
    pub fn meta(&self) -> BlockMeta {
        BlockMeta::new(self.height, self.hash)
    }

    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &ChainEntry) -> bool {
        self.height == parent.height + 1 && self.prev_hash == parent.hash
    }
}

/// Identifies an entry either by hash or by best-chain height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Hash(Hash256),
    Height(u32),
}

impl From<Hash256> for BlockId {
    fn from(hash: Hash256) -> Self {
        Self::Hash(hash)
    }
}

impl From<u32> for BlockId {
    fn from(height: u32) -> Self {
        Self::Height(height)
    }
}

// ─── Coins ────────────────────────────────────────────────────────────────────

/// An output together with where it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: u64,
    pub address: Option<AddressHash>,
    pub height: u32,
}

/// The coins spent by a block's inputs, keyed by outpoint.
///
/// Supplied by the chain source alongside connect/disconnect notifications
/// so that spends can be attributed to addresses.
#[derive(Debug, Clone, Default)]
pub struct CoinView {
    coins: HashMap<OutPoint, Coin>,
}

impl CoinView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coin: Coin) {
        self.coins.insert(coin.outpoint, coin);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl FromIterator<Coin> for CoinView {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        let mut view = Self::new();
        for coin in iter {
            view.insert(coin);
        }
        view
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
