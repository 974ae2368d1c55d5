//! Transaction module - envelope building, signing and submission
//!
//! Every compounding round is simulated first to size gas, then rebuilt with
//! the real fee, signed by each withdrawing account and broadcast in sync
//! mode.

pub mod builder;
pub mod signer;

pub use builder::{CompoundOutcome, GasPlan, TransactionBuilder, TxMessage, TxSettings};
pub use signer::TransactionSigner;
