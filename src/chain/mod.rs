//! Chain access - queries, gas simulation and broadcast
//!
//! The compounding engine only talks to the [`ChainClient`] trait.
//! [`RestChainClient`] implements it over the node's gRPC-gateway REST API,
//! transaction envelopes are encoded with the prost messages in [`proto`].
//!
//! Amount conventions at this boundary:
//! - [`Coin::amount`] is an integer string in native units (exponent 18)
//! - [`DecCoin::amount`] and [`Delegation::shares`] are integer strings in the
//!   36-exponent `Dec` encoding

pub mod proto;
pub mod rest;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use rest::RestChainClient;

/// Integer-unit coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

/// Coin in the 36-exponent `Dec` encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecCoin {
    pub denom: String,
    pub amount: String,
}

impl DecCoin {
    pub fn new(denom: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

/// Node identity returned by the health check
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub network: String,
    pub moniker: String,
    pub version: String,
}

/// One bonded position of a delegator
#[derive(Debug, Clone)]
pub struct Delegation {
    pub validator_address: String,
    pub shares: String,
}

/// One page of a delegator's delegations
#[derive(Debug, Clone, Default)]
pub struct DelegationPage {
    pub delegations: Vec<Delegation>,
    /// Continuation key; `None` (or empty) on the last page
    pub next_key: Option<Vec<u8>>,
}

impl DelegationPage {
    pub fn is_last(&self) -> bool {
        self.next_key.as_ref().map_or(true, |k| k.is_empty())
    }
}

/// Signing metadata of an on-chain account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// Broadcast mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Wait for the CheckTx result
    Sync,
}

impl BroadcastMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "BROADCAST_MODE_SYNC",
        }
    }
}

/// Chain response to a broadcast
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    pub tx_hash: String,
    pub height: i64,
    pub gas_used: u64,
    pub code: u32,
    pub raw_log: String,
}

impl BroadcastResult {
    /// Turn a non-zero result code into [`Error::BroadcastRejected`]
    pub fn into_result(self) -> Result<Self> {
        if self.code != 0 {
            return Err(Error::BroadcastRejected {
                code: self.code,
                log: self.raw_log,
            });
        }
        Ok(self)
    }
}

/// Chain queries and transaction submission
///
/// Every method may fail with a query or network error; callers treat that
/// as abandoning the current cycle.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Node info, doubles as a reachability check
    async fn node_info(&self) -> Result<NodeInfo>;

    /// Balance of one denomination
    async fn balance(&self, address: &str, denom: &str) -> Result<Coin>;

    /// Outstanding commission of a validator operator
    async fn validator_commission(&self, validator_address: &str) -> Result<Vec<DecCoin>>;

    /// Operator addresses the delegator is bonded to
    async fn delegator_validators(&self, delegator_address: &str) -> Result<Vec<String>>;

    /// Pending rewards of one delegator on one validator
    async fn delegation_rewards(
        &self,
        delegator_address: &str,
        validator_address: &str,
    ) -> Result<Vec<DecCoin>>;

    /// One page of delegations, starting at `page_key`
    async fn delegations(
        &self,
        delegator_address: &str,
        page_key: Option<Vec<u8>>,
    ) -> Result<DelegationPage>;

    /// Account number and sequence
    async fn account(&self, address: &str) -> Result<AccountInfo>;

    /// Dry-run an encoded `TxRaw`, returning gas used
    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64>;

    /// Submit an encoded, signed `TxRaw`
    async fn broadcast(&self, mode: BroadcastMode, tx_bytes: Vec<u8>) -> Result<BroadcastResult>;
}
