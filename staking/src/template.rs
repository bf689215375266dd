//! Block templates and the tagged proof carried alongside them
//!
//! A `BlockTemplate` is everything about the next block that does not
//! depend on which proof path produces it. `BlockProof` is a sum type
//! rather than two separate template structs: the nonce search and the
//! stake search both start from the same template and only differ in
//! what they fill in at the end, so modelling them as one type with a
//! tag keeps the rest of the pipeline (job bookkeeping, submission)
//! oblivious to which path is in play.

use driftcoin_core::{Block, BlockHeader, Hash, OutPoint, Transaction};
use serde::{Deserialize, Serialize};

/// The proof that makes a candidate block acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockProof {
    /// Legacy proof of work: a winning header nonce.
    Pow { nonce: u32 },
    /// Proof of stake: the block time that satisfied the kernel, the coin
    /// that was spent as stake, and the canonical signature over the
    /// block's identity hash.
    Stake {
        time: u32,
        coin: OutPoint,
        signature: Vec<u8>,
    },
}

impl BlockProof {
    pub fn is_stake(&self) -> bool {
        matches!(self, BlockProof::Stake { .. })
    }
}

/// Everything needed to assemble the next block except the winning proof.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub version: u32,
    pub height: u64,
    pub prev_block_hash: Hash,
    pub bits: u32,
    /// Transactions in block order. `transactions[0]` is always the
    /// coinbase; for a stake template `transactions[1]` is a placeholder
    /// coinstake transaction that the stake searcher re-signs once it has
    /// found a winning coin.
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    pub fn new(version: u32, height: u64, prev_block_hash: Hash, bits: u32, transactions: Vec<Transaction>) -> Self {
        BlockTemplate {
            version,
            height,
            prev_block_hash,
            bits,
            transactions,
        }
    }

    pub fn merkle_root(&self) -> Hash {
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
                next.push(driftcoin_crypto::sha256d(&combined));
            }
            hashes = next;
        }
        hashes[0]
    }

    /// Assemble a full block carrying `proof`. For proof of work, `timestamp`
    /// (the wall clock at submission time) and the winning nonce land in the
    /// header. For proof of stake, the header timestamp is the proof's own
    /// `time` — the grid-aligned block time the kernel was satisfied at, not
    /// wall clock — since the coinstake's signature and the kernel check are
    /// both over that time; `timestamp` is ignored and the header nonce
    /// stays zero. The caller is expected to have already replaced
    /// `transactions[1]` with the signed coinstake before calling this (the
    /// searcher does this before assembling the final block).
    pub fn into_block(&self, timestamp: u32, proof: &BlockProof) -> Block {
        let (header_timestamp, nonce) = match proof {
            BlockProof::Pow { nonce } => (timestamp, *nonce),
            BlockProof::Stake { time, .. } => (*time, 0),
        };

        let header = BlockHeader::new(
            self.version,
            self.prev_block_hash,
            self.merkle_root(),
            header_timestamp,
            self.bits,
            nonce,
        );

        let mut block = Block::new(header, self.transactions.clone());
        block.height = Some(self.height);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftcoin_core::Transaction;

    fn coinbase() -> Transaction {
        Transaction::coinbase(1, 50_000_000, &[0; 20], 0)
    }

    #[test]
    fn test_merkle_root_single_tx() {
        let tx = coinbase();
        let expected = tx.txid;
        let template = BlockTemplate::new(1, 1, [0; 32], 0x1e00ffff, vec![tx]);
        assert_eq!(template.merkle_root(), expected);
    }

    #[test]
    fn test_into_block_pow_carries_nonce() {
        let template = BlockTemplate::new(1, 1, [0; 32], 0x1e00ffff, vec![coinbase()]);
        let block = template.into_block(1_700_000_000, &BlockProof::Pow { nonce: 42 });
        assert_eq!(block.header.nonce, 42);
        assert_eq!(block.header.timestamp, 1_700_000_000);
        assert_eq!(block.height, Some(1));
    }

    #[test]
    fn test_into_block_stake_uses_proof_time_not_wall_clock() {
        let template = BlockTemplate::new(1, 1, [0; 32], 0x1e00ffff, vec![coinbase()]);
        let proof = BlockProof::Stake {
            time: 1_700_000_016,
            coin: OutPoint::new([1; 32], 0),
            signature: vec![1, 2, 3],
        };
        // Pass a wall-clock timestamp that differs from the proof's own
        // time; the header must carry the proof's time, not this one.
        let block = template.into_block(1_700_099_999, &proof);
        assert_eq!(block.header.timestamp, 1_700_000_016);
        assert_eq!(block.header.nonce, 0);
    }
}
