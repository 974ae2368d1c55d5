//! One compounding cycle: aggregate, select, build, sign, broadcast

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::amount::display;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::error::Result;
use crate::tx::{CompoundOutcome, TransactionBuilder, TxSettings};
use crate::wallet::Account;

use super::aggregator::{AccountState, ChainStateAggregator};
use super::policy::WithdrawalPolicy;
use super::scheduler::Cycle;

/// What a cycle ended with
#[derive(Debug)]
pub enum CycleReport {
    /// A query failed; nothing was published
    Abandoned { failures: usize },
    /// No account above the threshold, or nothing worth a message
    Idle,
    Compounded(CompoundOutcome),
}

pub struct Compounder {
    accounts: Vec<Account>,
    aggregator: ChainStateAggregator,
    builder: TransactionBuilder,
    policy: WithdrawalPolicy,
    denom: String,
}

impl Compounder {
    pub fn new(
        accounts: Vec<Account>,
        client: Arc<dyn ChainClient>,
        settings: TxSettings,
        policy: WithdrawalPolicy,
        period_secs: u64,
    ) -> Self {
        Self {
            accounts,
            aggregator: ChainStateAggregator::new(client.clone(), &settings.denom, period_secs),
            denom: settings.denom.clone(),
            builder: TransactionBuilder::new(client, settings, policy),
            policy,
        }
    }

    pub fn from_config(accounts: Vec<Account>, client: Arc<dyn ChainClient>, config: &Config) -> Self {
        let settings = TxSettings {
            chain_id: config.node.chain_id.clone(),
            denom: config.chain.denom.clone(),
            target_validator: config.chain.target_validator.clone(),
            gas_unit_cost: config.chain.gas_unit_cost,
            memo: config.chain.memo.clone(),
        };
        let policy = WithdrawalPolicy::new(
            config.compound.minimum_withdraw,
            config.compound.keep_unstaked,
        );

        Self::new(
            accounts,
            client,
            settings,
            policy,
            config.compound.recheck_period_secs,
        )
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let snapshot = match self.aggregator.aggregate(&self.accounts).await {
            Ok(snapshot) => snapshot,
            Err(failures) => {
                warn!(
                    "Cycle abandoned after {} failed quer{}, retrying next period",
                    failures.len(),
                    if failures.len() == 1 { "y" } else { "ies" }
                );
                return Ok(CycleReport::Abandoned {
                    failures: failures.len(),
                });
            }
        };

        info!("{}", snapshot.summary(&self.denom));

        let selected: Vec<(&Account, &AccountState)> = self
            .accounts
            .iter()
            .zip(snapshot.accounts.iter())
            .filter(|(account, state)| self.policy.is_selected(account, state))
            .collect();

        if selected.is_empty() {
            debug!("No account above the {} {} minimum", self.policy.minimum_withdraw, self.denom);
            return Ok(CycleReport::Idle);
        }

        for (account, state) in &selected {
            let pending = display(self.policy.account_pending(account, state));
            info!("{} selected: {} {} pending", account.label(), pending, self.denom);
        }

        Ok(match self.builder.compound(&selected).await? {
            Some(outcome) => CycleReport::Compounded(outcome),
            None => CycleReport::Idle,
        })
    }
}

#[async_trait]
impl Cycle for Compounder {
    async fn run_once(&mut self) -> Result<()> {
        self.run_cycle().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{dec_tokens, MockChain};
    use k256::ecdsa::SigningKey;
    use rust_decimal::Decimal;

    fn compounder(chain: Arc<MockChain>, accounts: Vec<Account>) -> Compounder {
        let mut config = Config::default();
        config.chain.target_validator = "fxvaloper1target".into();
        Compounder::from_config(accounts, chain, &config)
    }

    fn alice() -> Account {
        Account::delegator("fx1alice".into(), SigningKey::from_slice(&[3u8; 32]).unwrap(), 0, 2)
    }

    #[tokio::test]
    async fn test_cycle_compounds_selected_account() {
        let chain = Arc::new(MockChain::new("FX").with_delegator("fx1alice", "fxvaloper1x", &dec_tokens(120)));
        let mut compounder = compounder(chain.clone(), vec![alice()]);

        match compounder.run_cycle().await.unwrap() {
            CycleReport::Compounded(outcome) => {
                assert_eq!(outcome.messages, 2);
                assert_eq!(outcome.result.tx_hash, "C0FFEE");
            }
            other => panic!("expected a transaction, got {:?}", other),
        }
        assert_eq!(chain.simulated_count(), 1);
        assert_eq!(chain.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_cycle_below_threshold_is_idle() {
        let chain = Arc::new(MockChain::new("FX").with_delegator("fx1alice", "fxvaloper1x", &dec_tokens(105)));
        let mut compounder = compounder(chain.clone(), vec![alice()]);

        assert!(matches!(compounder.run_cycle().await.unwrap(), CycleReport::Idle));
        assert_eq!(chain.simulated_count(), 0);
    }

    #[tokio::test]
    async fn test_query_failure_abandons_cycle() {
        let chain = Arc::new(MockChain::new("FX").with_delegator("fx1alice", "fxvaloper1x", &dec_tokens(500)));
        chain.fail_for("fx1alice");
        let mut compounder = compounder(chain.clone(), vec![alice()]);

        let report = compounder.run_cycle().await.unwrap();
        assert!(matches!(report, CycleReport::Abandoned { failures } if failures > 0));
        assert_eq!(chain.simulated_count(), 0);
        assert_eq!(chain.broadcast_count(), 0);
        assert_eq!(compounder.aggregator.previous_pending(), None);

        chain.recover("fx1alice");
        compounder.run_cycle().await.unwrap();
        assert_eq!(compounder.aggregator.previous_pending(), Some(Decimal::from(500)));
    }
}
