//! Error types for the compounder

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Cosmos SDK ABCI code for `ErrWrongSequence`
pub const CODE_WRONG_SEQUENCE: u32 = 32;

/// Main error type for the compounder
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No accounts configured: at least one delegator or validator must resolve")]
    NoAccounts,

    // Key material errors
    #[error("Cannot decrypt seed phrase: {0}")]
    Decryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Address mismatch: expected {expected}, seed derives {derived}")]
    AddressMismatch { expected: String, derived: String },

    #[error("Address {address} not found in the first {searched} derivation indices of any seed")]
    AddressNotFound { address: String, searched: u32 },

    #[error("Address {address} resolves in more than one seed (seeds {seeds:?})")]
    AmbiguousAddress { address: String, seeds: Vec<usize> },

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("Unexpected account type for {address}: {type_url}")]
    UnexpectedAccountType { address: String, type_url: String },

    // Amount errors
    #[error("Invalid amount: {0}")]
    Amount(String),

    // Transaction errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction simulation failed: {0}")]
    TransactionSimulation(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Transaction rejected by chain (code {code}): {log}")]
    BroadcastRejected { code: u32, log: String },

    // Serialization errors
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Errors that abort the process before the scheduler starts
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::NoAccounts
                | Error::Decryption(_)
                | Error::KeyDerivation(_)
                | Error::AddressMismatch { .. }
                | Error::AddressNotFound { .. }
                | Error::AmbiguousAddress { .. }
                | Error::RpcConnection(_)
        )
    }

    /// The chain refused the envelope because an account sequence moved
    pub fn is_sequence_mismatch(&self) -> bool {
        matches!(self, Error::BroadcastRejected { code, .. } if *code == CODE_WRONG_SEQUENCE)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::RpcConnection(e.to_string())
        } else {
            Error::Rpc(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(e: rust_decimal::Error) -> Self {
        Error::Amount(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_fatal_classification() {
        assert!(Error::NoAccounts.is_startup_fatal());
        assert!(Error::Decryption("bad padding".into()).is_startup_fatal());
        assert!(Error::AddressMismatch {
            expected: "fxvaloper1a".into(),
            derived: "fxvaloper1b".into()
        }
        .is_startup_fatal());
        assert!(!Error::Rpc("timeout".into()).is_startup_fatal());
        assert!(!Error::TransactionSimulation("out of gas".into()).is_startup_fatal());
    }

    #[test]
    fn test_sequence_mismatch_detection() {
        let rejected = Error::BroadcastRejected {
            code: CODE_WRONG_SEQUENCE,
            log: "account sequence mismatch, expected 8, got 7".into(),
        };
        assert!(rejected.is_sequence_mismatch());

        let other = Error::BroadcastRejected {
            code: 5,
            log: "insufficient funds".into(),
        };
        assert!(!other.is_sequence_mismatch());
    }
}
