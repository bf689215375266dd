//! Block and BlockHeader implementations for DriftCoin
//!
//! Header layout is the 80-byte Bitcoin-style wire format: version (4),
//! previous block hash (32), merkle root (32), timestamp (4), bits (4),
//! nonce (4). Block identity hashing is version-gated: headers below
//! version 7 (legacy proof-of-work blocks) hash with scrypt; version 7
//! and above (proof-of-stake blocks) hash with SHA-256d. Height is not
//! part of the wire header — it lives on `Block` alongside the
//! transactions, since it is chain-position metadata, not header state.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use driftcoin_crypto::{scrypt_hash, sha256d, CryptoError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Cursor, Write};
use thiserror::Error;

use crate::{Hash, Transaction, TransactionValidationError};

/// Block versions at or above this value use the proof-of-stake kernel and
/// SHA-256d block identity hashing; versions below it are legacy
/// proof-of-work blocks hashed with scrypt.
pub const POS_VERSION: u32 = 7;

/// Wire size of a serialized block header, in bytes.
pub const HEADER_SIZE: usize = 80;

/// Block validation errors
#[derive(Debug, Error)]
pub enum BlockValidationError {
    /// Invalid proof of work
    #[error("Invalid proof of work")]
    InvalidProofOfWork,

    /// Invalid merkle root
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,

    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Invalid transaction
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionValidationError),

    /// Invalid block size
    #[error("Block exceeds maximum size")]
    ExceedsMaximumSize,

    /// Invalid coinbase transaction
    #[error("Invalid coinbase transaction: {0}")]
    InvalidCoinbase(String),

    /// Invalid previous block
    #[error("Invalid previous block: {0}")]
    InvalidPreviousBlock(String),

    /// Header failed to (de)serialize
    #[error("Header codec error: {0}")]
    Codec(String),

    /// Underlying identity hash function failed
    #[error("Hashing error: {0}")]
    Hashing(#[from] CryptoError),
}

impl From<io::Error> for BlockValidationError {
    fn from(e: io::Error) -> Self {
        BlockValidationError::Codec(e.to_string())
    }
}

/// Block header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version
    pub version: u32,

    /// Hash of the previous block
    pub prev_block_hash: Hash,

    /// Merkle root of transactions
    pub merkle_root: Hash,

    /// Block timestamp
    pub timestamp: u32,

    /// Difficulty bits (compact target)
    pub bits: u32,

    /// Nonce. For PoW blocks this is searched by the nonce searcher; for
    /// PoS blocks it is fixed at zero and carries no meaning.
    pub nonce: u32,
}

impl BlockHeader {
    /// Create a new block header
    pub fn new(
        version: u32,
        prev_block_hash: Hash,
        merkle_root: Hash,
        timestamp: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        }
    }

    /// Serialize to the canonical 80-byte wire format.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_u32::<LittleEndian>(self.version).unwrap();
            cursor.write_all(&self.prev_block_hash).unwrap();
            cursor.write_all(&self.merkle_root).unwrap();
            cursor.write_u32::<LittleEndian>(self.timestamp).unwrap();
            cursor.write_u32::<LittleEndian>(self.bits).unwrap();
            cursor.write_u32::<LittleEndian>(self.nonce).unwrap();
        }
        buf
    }

    /// Parse a header from its 80-byte wire format.
    pub fn parse(bytes: &[u8]) -> Result<Self, BlockValidationError> {
        if bytes.len() != HEADER_SIZE {
            return Err(BlockValidationError::Codec(format!(
                "expected {} header bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u32::<LittleEndian>()?;
        let mut prev_block_hash = [0u8; 32];
        io::Read::read_exact(&mut cursor, &mut prev_block_hash)?;
        let mut merkle_root = [0u8; 32];
        io::Read::read_exact(&mut cursor, &mut merkle_root)?;
        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let bits = cursor.read_u32::<LittleEndian>()?;
        let nonce = cursor.read_u32::<LittleEndian>()?;

        Ok(BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    /// Block identity hash. Legacy (pre-PoS) versions use scrypt; modern
    /// versions use SHA-256d. This is the value compared against the
    /// difficulty target for PoW blocks, and the value that the chain
    /// indexes blocks by regardless of proof type.
    pub fn identity_hash(&self) -> Result<Hash, BlockValidationError> {
        let bytes = self.serialize();
        if self.version < POS_VERSION {
            Ok(scrypt_hash(&bytes)?)
        } else {
            Ok(sha256d(&bytes))
        }
    }

    /// Get the block timestamp as a DateTime
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp as i64, 0).unwrap()
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockHeader {{ version: {}, prev: {}, merkle: {}, time: {}, bits: {:08x}, nonce: {} }}",
            self.version,
            hex::encode(&self.prev_block_hash[0..4]),
            hex::encode(&self.merkle_root[0..4]),
            self.datetime().format("%Y-%m-%d %H:%M:%S"),
            self.bits,
            self.nonce
        )
    }
}

/// Block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,

    /// Transactions. For a PoS block, `transactions[1]` is the coinstake
    /// transaction carrying the kernel's spent coin and its new outputs.
    pub transactions: Vec<Transaction>,

    /// Block height (not part of the serialized wire header)
    #[serde(skip)]
    pub height: Option<u64>,
}

impl Block {
    /// Create a new block
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
            height: None,
        }
    }

    /// Get the block's identity hash
    pub fn hash(&self) -> Result<Hash, BlockValidationError> {
        self.header.identity_hash()
    }

    /// Calculate the merkle root of the transactions as a binary tree of
    /// SHA-256d digests, duplicating the last hash on an odd row.
    pub fn calculate_merkle_root(&self) -> Hash {
        if self.transactions.is_empty() {
            return [0; 32];
        }

        let mut hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.txid).collect();

        while hashes.len() > 1 {
            if hashes.len() % 2 != 0 {
                hashes.push(*hashes.last().unwrap());
            }

            let mut next = Vec::with_capacity(hashes.len() / 2);
            for pair in hashes.chunks(2) {
                let mut combined = [0u8; 64];
                combined[0..32].copy_from_slice(&pair[0]);
                combined[32..64].copy_from_slice(&pair[1]);
                next.push(sha256d(&combined));
            }
            hashes = next;
        }

        hashes[0]
    }

    /// Validate the block's shape (merkle root, timestamp bound, coinbase
    /// placement). Proof-of-stake kernel verification and difficulty
    /// checks live in `driftcoin-consensus`, not here.
    pub fn validate(&self, max_block_size: usize) -> Result<(), BlockValidationError> {
        let estimated_size = HEADER_SIZE + (self.transactions.len() * 250);
        if estimated_size > max_block_size {
            return Err(BlockValidationError::ExceedsMaximumSize);
        }

        let merkle_root = self.calculate_merkle_root();
        if merkle_root != self.header.merkle_root {
            return Err(BlockValidationError::InvalidMerkleRoot);
        }

        let now = Utc::now().timestamp() as u32;
        if self.header.timestamp > now + 7200 {
            return Err(BlockValidationError::InvalidTimestamp(format!(
                "Block timestamp too far in the future: {}",
                self.header.timestamp
            )));
        }

        if self.transactions.is_empty() {
            return Err(BlockValidationError::InvalidCoinbase(
                "Missing coinbase transaction".to_string(),
            ));
        }

        for (i, tx) in self.transactions.iter().enumerate() {
            if i == 0 {
                if tx.inputs.len() != 1 || tx.inputs[0].prev_txid != [0; 32] {
                    return Err(BlockValidationError::InvalidCoinbase(
                        "First transaction must be coinbase".to_string(),
                    ));
                }
            } else if tx.inputs.is_empty() {
                return Err(BlockValidationError::InvalidTransaction(
                    TransactionValidationError::NoInputs,
                ));
            }

            if tx.outputs.is_empty() && !tx.is_coinbase() {
                return Err(BlockValidationError::InvalidTransaction(
                    TransactionValidationError::NoOutputs,
                ));
            }
        }

        Ok(())
    }

    /// Whether this block uses the proof-of-stake kernel rather than the
    /// legacy nonce search.
    pub fn is_proof_of_stake(&self) -> bool {
        self.header.version >= POS_VERSION
    }

    /// Get the total fees in the block (rough estimate pending full UTXO
    /// lookups; callers that need exact fees should sum from the UTXO set).
    pub fn get_total_fees(&self) -> u64 {
        if self.transactions.len() <= 1 {
            return 0;
        }
        self.transactions.len() as u64 * 1000
    }

    /// Get the coinbase reward for this block
    pub fn get_coinbase_reward(&self, subsidy: u64) -> u64 {
        subsidy + self.get_total_fees()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = self.hash().unwrap_or([0u8; 32]);
        write!(
            f,
            "Block {{ height: {}, hash: {}, txs: {} }}",
            self.height.map_or("unknown".to_string(), |h| h.to_string()),
            hex::encode(&hash[0..8]),
            self.transactions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TransactionInput, TransactionOutput};

    fn create_test_tx(is_coinbase: bool) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            txid: [0; 32],
        };

        if is_coinbase {
            tx.inputs.push(TransactionInput {
                prev_txid: [0; 32],
                prev_vout: 0xffffffff,
                script_sig: vec![1, 2, 3, 4],
                sequence: 0xffffffff,
            });
        } else {
            let mut prev_txid = [0; 32];
            prev_txid[0] = 1;

            tx.inputs.push(TransactionInput {
                prev_txid,
                prev_vout: 0,
                script_sig: vec![0x30, 0x45, 0x02, 0x20],
                sequence: 0xffffffff,
            });
        }

        tx.outputs.push(TransactionOutput {
            value: 50_000_000,
            script_pubkey: vec![0x76, 0xa9, 0x14],
        });

        let mut txid = [0; 32];
        txid[0] = if is_coinbase { 0 } else { 1 };
        tx.txid = txid;

        tx
    }

    fn test_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            timestamp: Utc::now().timestamp() as u32,
            bits: 0x1d00ffff,
            nonce: 0,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = test_header();
        header.prev_block_hash[3] = 0xab;
        header.nonce = 0xdeadbeef;

        let bytes = header.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let parsed = BlockHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.version, header.version);
        assert_eq!(parsed.prev_block_hash, header.prev_block_hash);
        assert_eq!(parsed.nonce, header.nonce);
    }

    #[test]
    fn test_identity_hash_differs_by_version() {
        let mut legacy = test_header();
        legacy.version = 1;
        let mut modern = test_header();
        modern.version = POS_VERSION;

        let legacy_hash = legacy.identity_hash().unwrap();
        let modern_hash = modern.identity_hash().unwrap();
        assert_ne!(legacy_hash, modern_hash);
    }

    #[test]
    fn test_identity_hash_stable_for_same_bytes() {
        let header = test_header();
        assert_eq!(header.identity_hash().unwrap(), header.identity_hash().unwrap());
    }

    #[test]
    fn test_block_creation_and_validation() {
        let header = test_header();

        let coinbase_tx = create_test_tx(true);
        let regular_tx = create_test_tx(false);

        let mut block = Block::new(header, vec![coinbase_tx, regular_tx]);

        let merkle_root = block.calculate_merkle_root();
        block.header.merkle_root = merkle_root;

        let result = block.validate(1_000_000);
        assert!(result.is_ok());

        let mut invalid_block = block.clone();
        invalid_block.header.merkle_root = [1; 32];
        let result = invalid_block.validate(1_000_000);
        assert!(matches!(result, Err(BlockValidationError::InvalidMerkleRoot)));

        let mut invalid_block = block.clone();
        invalid_block.header.timestamp = Utc::now().timestamp() as u32 + 10000;
        let result = invalid_block.validate(1_000_000);
        assert!(matches!(result, Err(BlockValidationError::InvalidTimestamp(_))));

        let mut invalid_block = block.clone();
        invalid_block.transactions = vec![create_test_tx(false)];
        let result = invalid_block.validate(1_000_000);
        assert!(matches!(result, Err(BlockValidationError::InvalidCoinbase(_))));
    }
}
