//! Scripted in-memory chain for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{
    AccountInfo, BroadcastMode, BroadcastResult, ChainClient, Coin, DecCoin, Delegation,
    DelegationPage, NodeInfo,
};

/// Whole tokens in the 36-exponent `Dec` integer encoding
pub fn dec_tokens(tokens: u64) -> String {
    format!("{}{}", tokens, "0".repeat(36))
}

/// Whole tokens in native integer units
pub fn native_tokens(tokens: u64) -> String {
    format!("{}{}", tokens, "0".repeat(18))
}

#[derive(Default)]
pub struct MockChain {
    pub denom: String,
    pub balances: HashMap<String, String>,
    pub commissions: HashMap<String, Vec<DecCoin>>,
    pub bonded: HashMap<String, Vec<String>>,
    pub rewards: HashMap<(String, String), Vec<DecCoin>>,
    /// Delegation pages per delegator, served in order
    pub delegation_pages: HashMap<String, Vec<Vec<Delegation>>>,
    pub accounts: HashMap<String, AccountInfo>,
    pub gas_used: u64,
    /// Sequence increment applied to every account after each simulation
    pub sequence_bump_after_simulate: u64,
    pub broadcast_code: u32,
    pub fail_simulate: bool,
    failing: Mutex<HashSet<String>>,
    sequence_offset: Mutex<u64>,
    pub simulated: Mutex<Vec<Vec<u8>>>,
    pub broadcasted: Mutex<Vec<Vec<u8>>>,
}

impl MockChain {
    pub fn new(denom: &str) -> Self {
        Self {
            denom: denom.to_string(),
            gas_used: 200_000,
            ..Default::default()
        }
    }

    /// Plain delegator with a balance and rewards on one validator
    pub fn with_delegator(mut self, address: &str, validator: &str, rewards: &str) -> Self {
        self.balances.insert(address.to_string(), native_tokens(1));
        self.bonded
            .entry(address.to_string())
            .or_default()
            .push(validator.to_string());
        self.rewards.insert(
            (address.to_string(), validator.to_string()),
            vec![DecCoin::new(self.denom.clone(), rewards)],
        );
        self.accounts.insert(
            address.to_string(),
            AccountInfo {
                account_number: self.accounts.len() as u64 + 10,
                sequence: 3,
            },
        );
        self
    }

    pub fn with_commission(mut self, validator: &str, commission: &str) -> Self {
        self.commissions.insert(
            validator.to_string(),
            vec![DecCoin::new(self.denom.clone(), commission)],
        );
        self
    }

    /// Make every query mentioning `address` fail
    pub fn fail_for(&self, address: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(address.to_string());
        }
    }

    pub fn recover(&self, address: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(address);
        }
    }

    fn check(&self, addresses: &[&str]) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| Error::Internal("mock lock poisoned".into()))?;
        match addresses.iter().find(|a| failing.contains(**a)) {
            Some(address) => Err(Error::Rpc(format!("injected failure for {}", address))),
            None => Ok(()),
        }
    }

    pub fn simulated_count(&self) -> usize {
        self.simulated.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasted.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn node_info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            network: "fxcore".into(),
            moniker: "mock".into(),
            version: "test".into(),
        })
    }

    async fn balance(&self, address: &str, denom: &str) -> Result<Coin> {
        self.check(&[address])?;
        Ok(Coin {
            denom: denom.to_string(),
            amount: self.balances.get(address).cloned().unwrap_or_else(|| "0".into()),
        })
    }

    async fn validator_commission(&self, validator_address: &str) -> Result<Vec<DecCoin>> {
        self.check(&[validator_address])?;
        Ok(self.commissions.get(validator_address).cloned().unwrap_or_default())
    }

    async fn delegator_validators(&self, delegator_address: &str) -> Result<Vec<String>> {
        self.check(&[delegator_address])?;
        Ok(self.bonded.get(delegator_address).cloned().unwrap_or_default())
    }

    async fn delegation_rewards(
        &self,
        delegator_address: &str,
        validator_address: &str,
    ) -> Result<Vec<DecCoin>> {
        self.check(&[delegator_address, validator_address])?;
        Ok(self
            .rewards
            .get(&(delegator_address.to_string(), validator_address.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delegations(
        &self,
        delegator_address: &str,
        page_key: Option<Vec<u8>>,
    ) -> Result<DelegationPage> {
        self.check(&[delegator_address])?;
        let pages = self
            .delegation_pages
            .get(delegator_address)
            .cloned()
            .unwrap_or_default();
        let index = page_key.and_then(|k| k.first().copied()).unwrap_or(0) as usize;

        Ok(DelegationPage {
            delegations: pages.get(index).cloned().unwrap_or_default(),
            next_key: (index + 1 < pages.len()).then(|| vec![(index + 1) as u8]),
        })
    }

    async fn account(&self, address: &str) -> Result<AccountInfo> {
        self.check(&[address])?;
        let offset = *self
            .sequence_offset
            .lock()
            .map_err(|_| Error::Internal("mock lock poisoned".into()))?;
        self.accounts
            .get(address)
            .map(|info| AccountInfo {
                account_number: info.account_number,
                sequence: info.sequence + offset,
            })
            .ok_or_else(|| Error::Rpc(format!("account {} not found", address)))
    }

    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64> {
        if self.fail_simulate {
            return Err(Error::TransactionSimulation("out of gas".into()));
        }
        if let Ok(mut simulated) = self.simulated.lock() {
            simulated.push(tx_bytes);
        }
        if let Ok(mut offset) = self.sequence_offset.lock() {
            *offset += self.sequence_bump_after_simulate;
        }
        Ok(self.gas_used)
    }

    async fn broadcast(&self, _mode: BroadcastMode, tx_bytes: Vec<u8>) -> Result<BroadcastResult> {
        if let Ok(mut broadcasted) = self.broadcasted.lock() {
            broadcasted.push(tx_bytes);
        }
        BroadcastResult {
            tx_hash: "C0FFEE".into(),
            height: 1234,
            gas_used: self.gas_used,
            code: self.broadcast_code,
            raw_log: if self.broadcast_code == 0 {
                "[]".into()
            } else {
                "account sequence mismatch".into()
            },
        }
        .into_result()
    }
}
