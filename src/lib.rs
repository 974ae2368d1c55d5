//! Staking Auto-Compounder Library
//!
//! Periodically withdraws staking rewards and validator commission for
//! accounts derived from encrypted seed phrases and re-delegates them.

pub mod amount;
pub mod chain;
pub mod cli;
pub mod compound;
pub mod config;
pub mod error;
pub mod tx;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
