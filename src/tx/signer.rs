//! SIGN_MODE_DIRECT signing
//!
//! Each signer signs `SHA-256(SignDoc)` where the sign doc binds the body,
//! the auth info (all signer infos and the fee), the chain id and the
//! signer's own account number. Signatures are 64-byte `r || s`, low-S,
//! without recovery id.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use prost::Message;
use sha2::{Digest, Sha256};

use crate::chain::proto::SignDoc;
use crate::error::{Error, Result};

/// One required signer: its key and on-chain account number
pub struct SignerRef<'a> {
    pub key: &'a SigningKey,
    pub account_number: u64,
}

#[derive(Debug, Clone)]
pub struct TransactionSigner {
    chain_id: String,
}

impl TransactionSigner {
    pub fn new(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
        }
    }

    /// Canonical sign bytes for one signer
    pub fn sign_bytes(&self, body_bytes: &[u8], auth_info_bytes: &[u8], account_number: u64) -> Vec<u8> {
        SignDoc {
            body_bytes: body_bytes.to_vec(),
            auth_info_bytes: auth_info_bytes.to_vec(),
            chain_id: self.chain_id.clone(),
            account_number,
        }
        .encode_to_vec()
    }

    pub fn sign(
        &self,
        key: &SigningKey,
        body_bytes: &[u8],
        auth_info_bytes: &[u8],
        account_number: u64,
    ) -> Result<Vec<u8>> {
        let sign_bytes = self.sign_bytes(body_bytes, auth_info_bytes, account_number);
        sign_digest(key, &sign_bytes)
    }

    /// Sign for every signer, keeping signer order
    pub fn sign_all(
        &self,
        signers: &[SignerRef<'_>],
        body_bytes: &[u8],
        auth_info_bytes: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        signers
            .iter()
            .map(|s| self.sign(s.key, body_bytes, auth_info_bytes, s.account_number))
            .collect()
    }
}

/// ECDSA/secp256k1 over SHA-256 of `message`
pub fn sign_digest(key: &SigningKey, message: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha256::digest(message);
    let signature: Signature = key
        .sign_prehash(&digest)
        .map_err(|e| Error::TransactionBuild(format!("signing failed: {}", e)))?;
    let signature = signature.normalize_s().unwrap_or(signature);
    Ok(signature.to_bytes().to_vec())
}
