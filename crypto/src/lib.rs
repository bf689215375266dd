//! Cryptographic primitives for DriftCoin
//!
//! Everything in this crate is a thin, stateless wrapper around a
//! well-audited primitive: secp256k1 signing/verification, SHA-256d
//! (double SHA-256) block/transaction hashing, and the scrypt KDF used
//! as the block identity hash for legacy (pre-SHA256d) block versions.
//! Consensus-level code never reaches for `sha2`/`scrypt` directly; it
//! goes through the functions here so there is exactly one place that
//! knows the wire byte order.

use scrypt::Params as ScryptParams;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKey,
    #[error("Signing failed")]
    SigningError,
    #[error("Verification failed")]
    VerificationError,
    #[error("Invalid scrypt parameters")]
    InvalidScryptParams,
}

/// Represents a DriftCoin address (RIPEMD-less pubkey-hash for simplicity,
/// matching the teacher's single-SHA256-then-truncate scheme).
pub struct Address(Vec<u8>);

impl Address {
    /// Create a new address from a public key
    pub fn from_pubkey(pubkey: &PublicKey) -> Self {
        let pubkey_bytes = pubkey.serialize_uncompressed();
        let mut hasher = Sha256::new();
        hasher.update(&pubkey_bytes);
        let hash = hasher.finalize();
        Address(hash[..20].to_vec())
    }

    /// Convert address to base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Create address from base58 string
    pub fn from_base58(s: &str) -> Result<Self, CryptoError> {
        match bs58::decode(s).into_vec() {
            Ok(bytes) if bytes.len() == 20 => Ok(Address(bytes)),
            _ => Err(CryptoError::InvalidKey),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Hashes an arbitrary message with a single round of SHA-256. Used for
/// general-purpose (non-consensus) signing, e.g. wallet message signing.
pub fn hash_message(msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// Double SHA-256, the hash primitive consensus code uses for kernel
/// hashing, the stake-modifier chain, and (for version >= 7) block
/// identity hashing.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// scrypt(data, data, N=1024, r=1, p=1, dkLen=32) — the legacy (version < 7)
/// block identity hash. The header itself is used as both password and
/// salt, matching the consensus rule in use by pre-SHA256d block versions.
pub fn scrypt_hash(header: &[u8]) -> Result<[u8; 32], CryptoError> {
    // log2(1024) == 10
    let params = ScryptParams::new(10, 1, 1, 32).map_err(|_| CryptoError::InvalidScryptParams)?;
    let mut out = [0u8; 32];
    scrypt::scrypt(header, header, &params, &mut out).map_err(|_| CryptoError::InvalidScryptParams)?;
    Ok(out)
}

/// Signs an arbitrary message, hashing it with a single SHA-256 first.
pub fn sign_message(msg: &[u8], secret_key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    sign_canonical(&hash_message(msg), secret_key)
}

/// Signs a pre-computed 32-byte hash directly, producing a canonical
/// (low-S, DER-free compact) ECDSA signature — `secp256k1.signCanonical`
/// in the external-interface contract. Used to sign block hashes, where
/// the hash has already been computed by the caller and must not be
/// re-hashed before signing.
pub fn sign_canonical(hash: &[u8; 32], secret_key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let secp = Secp256k1::new();
    let msg = Message::from_slice(hash).map_err(|_| CryptoError::SigningError)?;
    Ok(secp.sign_ecdsa(&msg, secret_key).serialize_compact().to_vec())
}

/// Verifies a signature over an arbitrary message (single SHA-256 first).
pub fn verify_signature(msg: &[u8], signature: &[u8], public_key: &PublicKey) -> Result<bool, CryptoError> {
    verify_canonical(&hash_message(msg), signature, public_key)
}

/// Verifies a signature over a pre-computed 32-byte hash.
pub fn verify_canonical(hash: &[u8; 32], signature: &[u8], public_key: &PublicKey) -> Result<bool, CryptoError> {
    let secp = Secp256k1::new();
    let msg = Message::from_slice(hash).map_err(|_| CryptoError::VerificationError)?;

    match secp.verify_ecdsa(
        &msg,
        &secp256k1::ecdsa::Signature::from_compact(signature).map_err(|_| CryptoError::VerificationError)?,
        public_key,
    ) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_address_generation() {
        let secp = Secp256k1::new();
        let (_secret_key, public_key) = secp.generate_keypair(&mut thread_rng());
        let address = Address::from_pubkey(&public_key);
        let base58 = address.to_base58();
        let decoded = Address::from_base58(&base58).unwrap();
        assert_eq!(address.0, decoded.0);
    }

    #[test]
    fn test_signing_and_verification() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut thread_rng());
        let message = b"Hello, DriftCoin!";

        let signature = sign_message(message, &secret_key).unwrap();
        let is_valid = verify_signature(message, &signature, &public_key).unwrap();
        assert!(is_valid);
    }

    #[test]
    fn test_sign_canonical_over_raw_hash() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut thread_rng());
        let hash = sha256d(b"block header bytes");

        let signature = sign_canonical(&hash, &secret_key).unwrap();
        assert!(verify_canonical(&hash, &signature, &public_key).unwrap());

        let other_hash = sha256d(b"different header bytes");
        assert!(!verify_canonical(&other_hash, &signature, &public_key).unwrap());
    }

    #[test]
    fn test_sha256d_matches_double_digest() {
        let data = b"abc";
        let once = Sha256::digest(data);
        let twice = Sha256::digest(once);
        assert_eq!(sha256d(data), <[u8; 32]>::from(twice));
    }

    #[test]
    fn test_scrypt_hash_deterministic() {
        let header = [7u8; 80];
        let a = scrypt_hash(&header).unwrap();
        let b = scrypt_hash(&header).unwrap();
        assert_eq!(a, b);
    }
}
