//! UTXO set management for DriftCoin
//!
//! This module implements the Unspent Transaction Output (UTXO) set
//! management for DriftCoin. It provides efficient storage and retrieval
//! of UTXOs, as well as state pruning to bound resource usage.
//!
//! A UTXO entry doubles as a stake "coin" candidate for the proof-of-stake
//! kernel: `confirmed_time` records the timestamp of the block that
//! confirmed it, which the kernel needs as `nTime` of the spent output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::{Hash, Transaction};

/// UTXO-related errors
#[derive(Debug, Error)]
pub enum UTXOError {
    /// UTXO not found
    #[error("UTXO not found: {0}")]
    NotFound(String),

    /// Double spend attempt
    #[error("Double spend attempt: {0}")]
    DoubleSpend(String),

    /// Invalid transaction
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

/// UTXO entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UTXOEntry {
    /// Transaction ID
    pub txid: Hash,

    /// Output index
    pub vout: u32,

    /// Output value
    pub value: u64,

    /// Output script (serialized)
    pub script_pubkey: Vec<u8>,

    /// Block height where this UTXO was created
    pub height: u64,

    /// Timestamp of the block that confirmed this output. This is the
    /// kernel's `nTime` for the spent coin when it is used as stake.
    pub confirmed_time: u32,

    /// Whether this output is coinbase
    pub is_coinbase: bool,
}

/// A UTXO entry considered as a stake candidate. Identical representation
/// to `UTXOEntry`; the alias exists so staking code reads as staking code.
pub type Coin = UTXOEntry;

/// Whether `coin`, confirmed at `coin.height`, has matured enough
/// confirmations as of `tip_height` to be spent as stake.
pub fn is_stake_eligible(tip_height: u64, coin: &Coin, min_confirmations: u64) -> bool {
    tip_height.saturating_sub(coin.height) >= min_confirmations
}

/// UTXO set
#[derive(Debug)]
pub struct UTXOSet {
    /// UTXO entries by outpoint (txid + vout)
    utxos: RwLock<HashMap<(Hash, u32), UTXOEntry>>,

    /// Pruning height (UTXOs below this height may be pruned)
    pruning_height: RwLock<u64>,

    /// Pruning enabled flag
    pruning_enabled: bool,
}

impl Clone for UTXOSet {
    /// Snapshots the current contents into a fresh, independently lockable set.
    fn clone(&self) -> Self {
        UTXOSet {
            utxos: RwLock::new(self.utxos.read().unwrap().clone()),
            pruning_height: RwLock::new(*self.pruning_height.read().unwrap()),
            pruning_enabled: self.pruning_enabled,
        }
    }
}

/// On-disk shape of a `UTXOSet`: a flat list of entries plus the pruning
/// state, since `RwLock` itself has no `Serialize` impl to derive from.
#[derive(Serialize, Deserialize)]
struct UTXOSetSnapshot {
    entries: Vec<UTXOEntry>,
    pruning_height: u64,
    pruning_enabled: bool,
}

impl Serialize for UTXOSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let snapshot = UTXOSetSnapshot {
            entries: self.utxos.read().unwrap().values().cloned().collect(),
            pruning_height: *self.pruning_height.read().unwrap(),
            pruning_enabled: self.pruning_enabled,
        };
        snapshot.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UTXOSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let snapshot = UTXOSetSnapshot::deserialize(deserializer)?;
        let utxos = snapshot
            .entries
            .into_iter()
            .map(|entry| ((entry.txid, entry.vout), entry))
            .collect();
        Ok(UTXOSet {
            utxos: RwLock::new(utxos),
            pruning_height: RwLock::new(snapshot.pruning_height),
            pruning_enabled: snapshot.pruning_enabled,
        })
    }
}

impl UTXOSet {
    /// Create a new UTXO set
    pub fn new(pruning_enabled: bool) -> Self {
        UTXOSet {
            utxos: RwLock::new(HashMap::new()),
            pruning_height: RwLock::new(0),
            pruning_enabled,
        }
    }

    /// Get a UTXO entry
    pub fn get(&self, txid: &Hash, vout: u32) -> Option<UTXOEntry> {
        let utxos = self.utxos.read().unwrap();
        utxos.get(&(*txid, vout)).cloned()
    }

    /// Check if a UTXO exists
    pub fn exists(&self, txid: &Hash, vout: u32) -> bool {
        let utxos = self.utxos.read().unwrap();
        utxos.contains_key(&(*txid, vout))
    }

    /// Add a UTXO entry
    pub fn add(&self, entry: UTXOEntry) -> Result<(), UTXOError> {
        let mut utxos = self.utxos.write().unwrap();
        let key = (entry.txid, entry.vout);

        if utxos.contains_key(&key) {
            return Err(UTXOError::DoubleSpend(format!(
                "UTXO already exists: {}:{}",
                hex::encode(entry.txid),
                entry.vout
            )));
        }

        utxos.insert(key, entry);
        Ok(())
    }

    /// Remove a UTXO entry
    pub fn remove(&self, txid: &Hash, vout: u32) -> Result<UTXOEntry, UTXOError> {
        let mut utxos = self.utxos.write().unwrap();
        let key = (*txid, vout);

        utxos.remove(&key).ok_or_else(|| {
            UTXOError::NotFound(format!("UTXO not found: {}:{}", hex::encode(*txid), vout))
        })
    }

    /// Process a transaction (add outputs, remove inputs)
    pub fn process_transaction(
        &self,
        tx: &Transaction,
        height: u64,
        confirmed_time: u32,
        is_coinbase: bool,
    ) -> Result<(), UTXOError> {
        if !is_coinbase {
            for input in &tx.inputs {
                self.remove(&input.prev_txid, input.prev_vout)?;
            }
        }

        for (vout, output) in tx.outputs.iter().enumerate() {
            let entry = UTXOEntry {
                txid: tx.txid,
                vout: vout as u32,
                value: output.value,
                script_pubkey: output.script_pubkey.clone(),
                height,
                confirmed_time,
                is_coinbase,
            };

            self.add(entry)?;
        }

        Ok(())
    }

    /// Process a block (add all transaction outputs, remove all inputs)
    pub fn process_block(&self, txs: &[Transaction], height: u64, timestamp: u32) -> Result<(), UTXOError> {
        if !txs.is_empty() {
            self.process_transaction(&txs[0], height, timestamp, true)?;
        }

        for tx in txs.iter().skip(1) {
            self.process_transaction(tx, height, timestamp, false)?;
        }

        Ok(())
    }

    /// Set the pruning height
    pub fn set_pruning_height(&self, height: u64) {
        let mut pruning_height = self.pruning_height.write().unwrap();
        *pruning_height = height;
    }

    /// Prune UTXOs below the pruning height
    pub fn prune(&self) -> Result<usize, UTXOError> {
        if !self.pruning_enabled {
            return Ok(0);
        }

        let pruning_height = *self.pruning_height.read().unwrap();
        let mut utxos = self.utxos.write().unwrap();

        let to_remove: Vec<(Hash, u32)> = utxos
            .iter()
            .filter(|(_, entry)| entry.height < pruning_height && !entry.is_coinbase)
            .map(|(key, _)| *key)
            .collect();

        let count = to_remove.len();
        for key in to_remove {
            utxos.remove(&key);
        }

        Ok(count)
    }

    /// Get the total number of UTXOs
    pub fn len(&self) -> usize {
        let utxos = self.utxos.read().unwrap();
        utxos.len()
    }

    /// Check if the UTXO set is empty
    pub fn is_empty(&self) -> bool {
        let utxos = self.utxos.read().unwrap();
        utxos.is_empty()
    }

    /// Calculate the total value in the UTXO set
    pub fn total_value(&self) -> u64 {
        let utxos = self.utxos.read().unwrap();
        utxos.values().map(|entry| entry.value).sum()
    }

    /// Get all UTXOs for an address. Matching is on the P2PKH hash encoded
    /// in the script, not a byte-prefix heuristic.
    pub fn get_for_address(&self, pubkey_hash: &[u8; 20]) -> Vec<UTXOEntry> {
        let utxos = self.utxos.read().unwrap();

        utxos
            .values()
            .filter(|entry| {
                entry.script_pubkey.len() == 25
                    && entry.script_pubkey[0] == 0x76
                    && entry.script_pubkey[1] == 0xa9
                    && &entry.script_pubkey[3..23] == pubkey_hash
            })
            .cloned()
            .collect()
    }

    /// Get every coin eligible to be spent as proof-of-stake at `tip_height`,
    /// owned by `pubkey_hash`.
    pub fn stake_candidates(&self, pubkey_hash: &[u8; 20], tip_height: u64, min_confirmations: u64) -> Vec<Coin> {
        self.get_for_address(pubkey_hash)
            .into_iter()
            .filter(|coin| is_stake_eligible(tip_height, coin, min_confirmations))
            .collect()
    }

    /// Get the best UTXOs for a given amount
    pub fn select_utxos(
        &self,
        pubkey_hash: &[u8; 20],
        amount: u64,
    ) -> Result<(Vec<UTXOEntry>, u64), UTXOError> {
        let utxos = self.get_for_address(pubkey_hash);

        if utxos.is_empty() {
            return Err(UTXOError::NotFound(format!(
                "No UTXOs found for address: {}",
                hex::encode(pubkey_hash)
            )));
        }

        let mut sorted_utxos = utxos;
        sorted_utxos.sort_by_key(|entry| entry.value);

        if let Some(entry) = sorted_utxos.iter().find(|entry| entry.value >= amount) {
            return Ok((vec![entry.clone()], entry.value - amount));
        }

        let mut selected = Vec::new();
        let mut total = 0;

        for entry in sorted_utxos {
            selected.push(entry.clone());
            total += entry.value;

            if total >= amount {
                return Ok((selected, total - amount));
            }
        }

        Err(UTXOError::NotFound(format!(
            "Insufficient funds: have {}, need {}",
            total, amount
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TransactionInput, TransactionOutput};

    fn create_test_tx(inputs: Vec<(Hash, u32)>, output_values: Vec<u64>) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            txid: [0; 32],
        };

        for (prev_txid, prev_vout) in inputs {
            tx.inputs.push(TransactionInput {
                prev_txid,
                prev_vout,
                script_sig: vec![],
                sequence: 0xffffffff,
            });
        }

        for value in output_values {
            tx.outputs.push(TransactionOutput {
                value,
                script_pubkey: vec![0x76, 0xa9, 0x14],
            });
        }

        let mut txid = [0; 32];
        txid[0] = tx.inputs.len() as u8;
        txid[1] = tx.outputs.len() as u8;
        tx.txid = txid;

        tx
    }

    #[test]
    fn test_utxo_add_remove() {
        let utxo_set = UTXOSet::new(false);

        let mut txid = [0; 32];
        txid[0] = 1;

        let entry = UTXOEntry {
            txid,
            vout: 0,
            value: 100,
            script_pubkey: vec![0x76, 0xa9, 0x14],
            height: 1,
            confirmed_time: 1_700_000_000,
            is_coinbase: true,
        };

        assert!(utxo_set.add(entry.clone()).is_ok());
        assert!(utxo_set.exists(&txid, 0));

        let retrieved = utxo_set.get(&txid, 0).unwrap();
        assert_eq!(retrieved.value, 100);

        let removed = utxo_set.remove(&txid, 0).unwrap();
        assert_eq!(removed.value, 100);

        assert!(!utxo_set.exists(&txid, 0));
    }

    #[test]
    fn test_process_transaction() {
        let utxo_set = UTXOSet::new(false);

        let coinbase_tx = create_test_tx(vec![], vec![50]);
        assert!(utxo_set.process_transaction(&coinbase_tx, 1, 1_700_000_000, true).is_ok());
        assert!(utxo_set.exists(&coinbase_tx.txid, 0));

        let spending_tx = create_test_tx(vec![(coinbase_tx.txid, 0)], vec![30, 20]);
        assert!(utxo_set.process_transaction(&spending_tx, 2, 1_700_000_100, false).is_ok());

        assert!(!utxo_set.exists(&coinbase_tx.txid, 0));
        assert!(utxo_set.exists(&spending_tx.txid, 0));
        assert!(utxo_set.exists(&spending_tx.txid, 1));

        assert_eq!(utxo_set.get(&spending_tx.txid, 0).unwrap().value, 30);
        assert_eq!(utxo_set.get(&spending_tx.txid, 1).unwrap().value, 20);
    }

    #[test]
    fn test_pruning() {
        let utxo_set = UTXOSet::new(true);

        for i in 0..10 {
            let mut txid = [0; 32];
            txid[0] = i as u8;

            let entry = UTXOEntry {
                txid,
                vout: 0,
                value: 100,
                script_pubkey: vec![0x76, 0xa9, 0x14],
                height: i,
                confirmed_time: 1_700_000_000,
                is_coinbase: i == 0,
            };

            assert!(utxo_set.add(entry).is_ok());
        }

        utxo_set.set_pruning_height(5);
        let pruned = utxo_set.prune().unwrap();

        assert_eq!(pruned, 4);
        assert_eq!(utxo_set.len(), 6);

        let mut coinbase_txid = [0; 32];
        coinbase_txid[0] = 0;
        assert!(utxo_set.exists(&coinbase_txid, 0));
    }

    #[test]
    fn test_stake_eligibility() {
        let coin = Coin {
            txid: [1; 32],
            vout: 0,
            value: 1_000_000,
            script_pubkey: vec![],
            height: 100,
            confirmed_time: 1_700_000_000,
            is_coinbase: false,
        };

        assert!(!is_stake_eligible(105, &coin, 10));
        assert!(is_stake_eligible(110, &coin, 10));
        assert!(is_stake_eligible(200, &coin, 10));
    }
}
