//! Bech32 addresses for secp256k1 keys
//!
//! A key's identity is `ripemd160(sha256(compressed_pubkey))`; the delegator
//! and validator-operator roles only differ by human-readable prefix.

use bech32::{Bech32, Hrp};
use k256::ecdsa::{SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Address prefixes of the two roles a key can play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPrefixes {
    pub account: String,
    pub validator: String,
}

impl AddressPrefixes {
    pub fn new(account: impl Into<String>, validator: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            validator: validator.into(),
        }
    }

    /// Delegator (account) address of a key
    pub fn delegator_address(&self, key: &SigningKey) -> Result<String> {
        encode(&self.account, &public_key_hash(key.verifying_key()))
    }

    /// Validator operator address of a key
    pub fn validator_address(&self, key: &SigningKey) -> Result<String> {
        encode(&self.validator, &public_key_hash(key.verifying_key()))
    }
}

/// 33-byte SEC1 compressed public key
pub fn compressed_public_key(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

/// 20-byte account identifier of a public key
pub fn public_key_hash(key: &VerifyingKey) -> [u8; 20] {
    let sha = Sha256::digest(compressed_public_key(key));
    Ripemd160::digest(sha).into()
}

/// Lower-case bech32 encoding of `data` under `prefix`
pub fn encode(prefix: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(prefix)
        .map_err(|e| Error::Config(format!("Invalid address prefix {}: {}", prefix, e)))?;

    bech32::encode::<Bech32>(hrp, data)
        .map_err(|e| Error::KeyDerivation(format!("bech32 encoding failed: {}", e)))
}
