//! JSON-RPC API Methods
//!
//! This module implements the JSON-RPC API methods for DriftCoin, providing
//! interfaces for blockchain queries, transaction submission, and mining operations.

use std::collections::HashMap;
use std::str::FromStr;

use log::{debug, error, info, warn};
use serde_json::{json, Value};

use driftcoin_core::{Address, Block, Hash, Transaction};
use driftcoin_network::SyncState;

use crate::{RpcContext, RpcError};

/// Get the best block hash
pub async fn get_best_block_hash(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let hash = context.block_store.get_best_block_hash().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    Ok(json!(hex::encode(hash)))
}

/// Get a block by hash
pub async fn get_block(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing block hash parameter".to_string()));
    }
    
    let hash_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Block hash must be a string".to_string()))?;
    let hash_bytes = hex::decode(hash_str).map_err(|_| RpcError::InvalidParams("Invalid block hash format".to_string()))?;
    
    if hash_bytes.len() != 32 {
        return Err(RpcError::InvalidParams("Block hash must be 32 bytes".to_string()));
    }
    
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hash_bytes);
    
    // Get the block
    let block = context.block_store.get_block(&hash).await
        .map_err(|_| RpcError::NotFound(format!("Block not found: {}", hash_str)))?;
    
    // Check if verbose output is requested
    let verbose = if params.len() > 1 {
        params[1].as_bool().unwrap_or(false)
    } else {
        false
    };
    
    if verbose {
        // Return detailed block information
        let prev_block_hash = hex::encode(block.header.prev_block_hash);
        let merkle_root = hex::encode(block.header.merkle_root);
        let hash = hex::encode(block.hash().map_err(|e| RpcError::InternalError(e.to_string()))?);

        let tx_hashes: Vec<String> = block.transactions.iter()
            .map(|tx| hex::encode(tx.hash()))
            .collect();

        Ok(json!({
            "hash": hash,
            "confirmations": 0, // Would be calculated based on current height
            "size": 0, // Would be the serialized size
            "height": block.height.unwrap_or(0),
            "version": block.header.version,
            "merkleroot": merkle_root,
            "tx": tx_hashes,
            "time": block.header.timestamp,
            "nonce": block.header.nonce,
            "bits": format!("{:x}", block.header.bits),
            "difficulty": 0.0, // Would be calculated from bits
            "previousblockhash": prev_block_hash,
            "nextblockhash": null, // Would be filled if known
        }))
    } else {
        // Return serialized block
        // In a real implementation, this would serialize the block
        Ok(json!("serialized_block_data"))
    }
}

/// Get blockchain information
pub async fn get_blockchain_info(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let best_block_hash = context.block_store.get_best_block_hash().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    let height = context.block_store.get_best_block_height().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    // Get sync state
    let sync_state = context.network.read().await.sync_state().await;
    let sync_progress = match sync_state {
        SyncState::SyncingBlocks { current_height, target_height, .. } => {
            if target_height > 0 {
                Some(current_height as f64 / target_height as f64)
            } else {
                Some(0.0)
            }
        },
        SyncState::SyncingHeaders { current_height, target_height } => {
            if target_height > 0 {
                Some(current_height as f64 / target_height as f64)
            } else {
                Some(0.0)
            }
        },
        SyncState::Idle => Some(0.0),
        SyncState::Complete => Some(1.0),
    };
    
    Ok(json!({
        "chain": "main", // or "test" or "regtest"
        "blocks": height,
        "headers": height, // In a fully synced node, headers == blocks
        "bestblockhash": hex::encode(best_block_hash),
        "difficulty": 0.0, // Would be calculated
        "mediantime": 0, // Would be calculated
        "verificationprogress": sync_progress.unwrap_or(0.0),
        "initialblockdownload": sync_state != SyncState::Complete,
        "chainwork": "0000000000000000000000000000000000000000000000000000000000000000", // Would be calculated
        "size_on_disk": 0, // Would be calculated
        "pruned": false,
        "softforks": {},
        "warnings": "",
    }))
}

/// Get the current block count
pub async fn get_block_count(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let height = context.block_store.get_best_block_height().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    Ok(json!(height))
}

/// Get a block hash by height
pub async fn get_block_hash(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing height parameter".to_string()));
    }
    
    let height = params[0].as_u64().ok_or_else(|| RpcError::InvalidParams("Height must be a number".to_string()))?;
    
    // Get the block hash
    let hash = context.block_store.get_block_hash(height).await
        .map_err(|_| RpcError::NotFound(format!("Block at height {} not found", height)))?;
    
    Ok(json!(hex::encode(hash)))
}

/// Get transaction output information
pub async fn get_tx_out(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.len() < 2 {
        return Err(RpcError::InvalidParams("Missing txid or vout parameter".to_string()));
    }
    
    let txid_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Txid must be a string".to_string()))?;
    let txid_bytes = hex::decode(txid_str).map_err(|_| RpcError::InvalidParams("Invalid txid format".to_string()))?;
    
    if txid_bytes.len() != 32 {
        return Err(RpcError::InvalidParams("Txid must be 32 bytes".to_string()));
    }
    
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&txid_bytes);
    
    let vout = params[1].as_u64().ok_or_else(|| RpcError::InvalidParams("Vout must be a number".to_string()))?;
    
    // Check if we should include mempool transactions
    let include_mempool = if params.len() > 2 {
        params[2].as_bool().unwrap_or(true)
    } else {
        true
    };
    
    // Get the transaction output
    // In a real implementation, this would query the UTXO set
    
    // For now, return a placeholder
    Ok(json!({
        "bestblock": "0000000000000000000000000000000000000000000000000000000000000000",
        "confirmations": 0,
        "value": 0.0,
        "scriptPubKey": {
            "asm": "",
            "hex": "",
            "reqSigs": 1,
            "type": "pubkeyhash",
            "addresses": ["smc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"]
        },
        "coinbase": false
    }))
}

/// Get the number of connections to other nodes
pub async fn get_connection_count(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let count = context.network.read().await.peer_count().await;
    
    Ok(json!(count))
}

/// Get information about connected peers
pub async fn get_peer_info(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let peers = context.network.read().await.connected_peers().await;
    
    let peer_info: Vec<Value> = peers.iter().map(|peer| {
        json!({
            "id": 0, // Would be a unique ID
            "addr": peer.addr.to_string(),
            "addrbind": peer.addr.to_string(),
            "addrlocal": "", // Would be our address as seen by the peer
            "services": format!("{:x}", peer.services),
            "relaytxes": true,
            "lastsend": 0, // Would be the timestamp
            "lastrecv": 0, // Would be the timestamp
            "bytessent": peer.bytes_sent,
            "bytesrecv": peer.bytes_received,
            "conntime": peer.connected_since,
            "timeoffset": 0,
            "pingtime": peer.ping_time.unwrap_or(0),
            "minping": 0,
            "version": peer.protocol_version,
            "subver": peer.user_agent,
            "inbound": !peer.outbound,
            "startingheight": 0,
            "banscore": 0,
            "synced_headers": peer.block_height,
            "synced_blocks": peer.block_height,
        })
    }).collect();
    
    Ok(json!(peer_info))
}

/// Get information about the network
pub async fn get_network_info(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let network = context.network.read().await;
    let peer_count = network.peer_count().await;
    
    Ok(json!({
        "version": 0, // Would be the protocol version
        "subversion": "/DriftCoin:0.1.0/",
        "protocolversion": 1,
        "localservices": "000000000000000d",
        "localrelay": true,
        "timeoffset": 0,
        "networkactive": true,
        "connections": peer_count,
        "networks": [
            {
                "name": "ipv4",
                "limited": false,
                "reachable": true,
                "proxy": "",
                "proxy_randomize_credentials": false
            },
            {
                "name": "ipv6",
                "limited": false,
                "reachable": true,
                "proxy": "",
                "proxy_randomize_credentials": false
            },
            {
                "name": "onion",
                "limited": true,
                "reachable": false,
                "proxy": "",
                "proxy_randomize_credentials": false
            }
        ],
        "relayfee": 0.00001000,
        "incrementalfee": 0.00001000,
        "localaddresses": [],
        "warnings": ""
    }))
}

/// Send a raw transaction
pub async fn send_raw_transaction(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing hexstring parameter".to_string()));
    }
    
    let hex_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Hexstring must be a string".to_string()))?;
    
    // Decode the transaction
    // In a real implementation, this would deserialize the transaction
    
    // Validate and relay the transaction
    // In a real implementation, this would validate and relay the transaction
    
    // Return the transaction ID
    Ok(json!("transaction_id"))
}

/// Get a raw transaction
pub async fn get_raw_transaction(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing txid parameter".to_string()));
    }
    
    let txid_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Txid must be a string".to_string()))?;
    let txid_bytes = hex::decode(txid_str).map_err(|_| RpcError::InvalidParams("Invalid txid format".to_string()))?;
    
    if txid_bytes.len() != 32 {
        return Err(RpcError::InvalidParams("Txid must be 32 bytes".to_string()));
    }
    
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&txid_bytes);
    
    // Check if verbose output is requested
    let verbose = if params.len() > 1 {
        params[1].as_bool().unwrap_or(false)
    } else {
        false
    };
    
    // Get the transaction
    // In a real implementation, this would query the transaction database
    
    if verbose {
        // Return detailed transaction information
        Ok(json!({
            "txid": txid_str,
            "hash": txid_str,
            "version": 1,
            "size": 0,
            "vsize": 0,
            "weight": 0,
            "locktime": 0,
            "vin": [],
            "vout": [],
            "hex": "",
            "blockhash": "",
            "confirmations": 0,
            "time": 0,
            "blocktime": 0,
        }))
    } else {
        // Return serialized transaction
        Ok(json!(""))
    }
}

/// Decode a raw transaction
pub async fn decode_raw_transaction(
    _context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing hexstring parameter".to_string()));
    }
    
    let hex_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Hexstring must be a string".to_string()))?;
    
    // Decode the transaction
    // In a real implementation, this would deserialize the transaction
    
    // Return transaction information
    Ok(json!({
        "txid": "0000000000000000000000000000000000000000000000000000000000000000",
        "hash": "0000000000000000000000000000000000000000000000000000000000000000",
        "version": 1,
        "size": 0,
        "vsize": 0,
        "weight": 0,
        "locktime": 0,
        "vin": [],
        "vout": [],
    }))
}

/// Get mining information
pub async fn get_mining_info(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let height = context.block_store.get_best_block_height().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    Ok(json!({
        "blocks": height,
        "currentblockweight": 0,
        "currentblocktx": 0,
        "difficulty": 0.0,
        "networkhashps": 0,
        "pooledtx": 0,
        "chain": "main",
        "warnings": "",
    }))
}

/// Submit a block
pub async fn submit_block(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing hexdata parameter".to_string()));
    }
    
    let hex_str = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Hexdata must be a string".to_string()))?;
    
    // Decode the block
    // In a real implementation, this would deserialize the block
    
    // Validate and add the block to the chain
    // In a real implementation, this would validate and add the block
    
    // Return result
    Ok(json!(null))
}

/// Get block template for mining
pub async fn get_block_template(
    context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.unwrap_or(json!({}));
    let template_request = params.as_object().ok_or_else(|| RpcError::InvalidParams("Parameters must be an object".to_string()))?;
    
    // Get the best block
    let best_block_hash = context.block_store.get_best_block_hash().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    let height = context.block_store.get_best_block_height().await
        .map_err(|e| RpcError::InternalError(e.to_string()))?;
    
    // Generate a block template
    // In a real implementation, this would generate a proper block template
    
    Ok(json!({
        "version": 1,
        "previousblockhash": hex::encode(best_block_hash),
        "transactions": [],
        "coinbaseaux": {
            "flags": ""
        },
        "coinbasevalue": 5000000000i64,
        "longpollid": "",
        "target": "0000000000000000000000000000000000000000000000000000000000000000",
        "mintime": 0,
        "mutable": ["time", "transactions", "prevblock"],
        "noncerange": "00000000ffffffff",
        "sigoplimit": 80000,
        "sizelimit": 4000000,
        "weightlimit": 4000000,
        "curtime": 0,
        "bits": "1d00ffff",
        "height": height + 1,
    }))
}

/// Start the staker supervisor's continuous block-production loop
pub async fn start_staking(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let staking = context.staking.as_ref()
        .ok_or_else(|| RpcError::InternalError("staking is not enabled on this node".to_string()))?;

    staking.start().await.map_err(|e| RpcError::InternalError(e.to_string()))?;
    Ok(json!(null))
}

/// Stop the staker supervisor's continuous block-production loop
pub async fn stop_staking(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let staking = context.staking.as_ref()
        .ok_or_else(|| RpcError::InternalError("staking is not enabled on this node".to_string()))?;

    staking.stop().await.map_err(|e| RpcError::InternalError(e.to_string()))?;
    Ok(json!(null))
}

/// Build a one-off job from the current tip and mempool, outside the
/// continuous supervisor loop
pub async fn create_job(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let staking = context.staking.as_ref()
        .ok_or_else(|| RpcError::InternalError("staking is not enabled on this node".to_string()))?;

    let summary = staking.create_job().await;
    Ok(json!(summary))
}

/// Attempt a single proof search against the job created by `createjob`
/// and submit it if one is found
pub async fn mine_block(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let staking = context.staking.as_ref()
        .ok_or_else(|| RpcError::InternalError("staking is not enabled on this node".to_string()))?;

    match staking.mine_block().await.map_err(|e| RpcError::InternalError(e.to_string()))? {
        Some(hash) => Ok(json!({ "found": true, "hash": hex::encode(hash) })),
        None => Ok(json!({ "found": false, "hash": null })),
    }
}

/// Query the staker supervisor's current state and in-flight job
pub async fn get_staking_info(
    context: &RpcContext,
    _params: Option<Value>,
) -> Result<Value, RpcError> {
    let staking = context.staking.as_ref()
        .ok_or_else(|| RpcError::InternalError("staking is not enabled on this node".to_string()))?;

    Ok(json!(staking.staking_info().await))
}

/// Validate an address
pub async fn validate_address(
    _context: &RpcContext,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    // Parse parameters
    let params = params.ok_or_else(|| RpcError::InvalidParams("Missing parameters".to_string()))?;
    let params = params.as_array().ok_or_else(|| RpcError::InvalidParams("Parameters must be an array".to_string()))?;
    
    if params.is_empty() {
        return Err(RpcError::InvalidParams("Missing address parameter".to_string()));
    }
    
    let address = params[0].as_str().ok_or_else(|| RpcError::InvalidParams("Address must be a string".to_string()))?;
    
    // Validate the address
    // In a real implementation, this would validate the address format and checksum
    
    let is_valid = address.starts_with("smc");
    
    Ok(json!({
        "isvalid": is_valid,
        "address": address,
        "scriptPubKey": "",
        "isscript": false,
        "iswitness": false,
    }))
}