//! Key material and account identities
//!
//! ```text
//! encrypted blobs → SeedVault → SeedUnit (m/44'/118'/0'/0)
//!                                   ↓
//!                            AccountResolver → Account
//! ```
//!
//! # Security
//!
//! - The password-derived AES key is computed once per session and passed
//!   by reference, never cached globally
//! - Plaintext password and mnemonics are zeroized after resolution
//! - Private keys never appear in `Debug` output or logs

pub mod address;
pub mod resolver;
pub mod types;
pub mod vault;

pub use address::AddressPrefixes;
pub use resolver::{resolve_accounts, AccountResolver, MAX_DERIVATION_INDEX};
pub use types::Account;
pub use vault::{decrypt_seed, encrypt_seed, SeedUnit, SeedVault, SessionKey};
