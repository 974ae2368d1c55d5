//! Resolved on-chain identities

use k256::ecdsa::SigningKey;

use super::address::compressed_public_key;

/// A resolved account: delegator identity, optional validator role and key
#[derive(Clone)]
pub struct Account {
    delegator_address: String,
    validator_address: Option<String>,
    signing_key: SigningKey,
    /// Position of the owning seed in the vault
    seed: usize,
    /// Derivation index under the account-level path
    index: u32,
}

impl Account {
    /// Plain delegator account
    pub fn delegator(delegator_address: String, signing_key: SigningKey, seed: usize, index: u32) -> Self {
        Self {
            delegator_address: delegator_address.to_lowercase(),
            validator_address: None,
            signing_key,
            seed,
            index,
        }
    }

    /// Validator self-bound account (always index 0)
    pub fn validator(
        delegator_address: String,
        validator_address: String,
        signing_key: SigningKey,
        seed: usize,
    ) -> Self {
        Self {
            delegator_address: delegator_address.to_lowercase(),
            validator_address: Some(validator_address.to_lowercase()),
            signing_key,
            seed,
            index: 0,
        }
    }

    pub fn delegator_address(&self) -> &str {
        &self.delegator_address
    }

    pub fn validator_address(&self) -> Option<&str> {
        self.validator_address.as_deref()
    }

    pub fn is_validator(&self) -> bool {
        self.validator_address.is_some()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Compressed secp256k1 public key
    pub fn public_key(&self) -> Vec<u8> {
        compressed_public_key(self.signing_key.verifying_key())
    }

    pub fn seed(&self) -> usize {
        self.seed
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Case-insensitive identity check
    pub fn has_address(&self, delegator_address: &str) -> bool {
        self.delegator_address.eq_ignore_ascii_case(delegator_address)
    }

    /// Human-readable label for logs
    pub fn label(&self) -> String {
        match &self.validator_address {
            Some(validator) => format!("'{}'/'{}'", validator, self.delegator_address),
            None => format!("'{}'", self.delegator_address),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("delegator_address", &self.delegator_address)
            .field("validator_address", &self.validator_address)
            .field("seed", &self.seed)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.delegator_address == other.delegator_address
    }
}

impl Eq for Account {}
