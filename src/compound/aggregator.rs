//! Per-cycle chain state aggregation
//!
//! Every account is queried concurrently; each query yields an explicit
//! result. The results are folded into either a complete [`Snapshot`] or the
//! list of every [`QueryFailure`] seen. A cycle with any failure publishes
//! nothing and leaves the earnings baseline untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::amount::{self, display};
use crate::chain::{ChainClient, DecCoin};
use crate::error::{Error, Result};
use crate::wallet::Account;

const SECONDS_PER_DAY: u64 = 86_400;

/// Per-account state of one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    /// Unstaked balance
    pub balance: Decimal,
    /// Outstanding commission, `None` for plain delegators or no entry
    pub commission: Option<Decimal>,
    /// Pending rewards keyed by validator operator address
    pub rewards: BTreeMap<String, Option<Decimal>>,
    /// Sum of delegated shares
    pub delegations: Decimal,
}

impl AccountState {
    pub fn total_rewards(&self) -> Decimal {
        self.rewards.values().flatten().copied().sum()
    }
}

/// Cycle-wide totals plus the per-account states they were built from
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub balance: Decimal,
    pub commission: Decimal,
    pub rewards: Decimal,
    pub delegations: Decimal,
    /// commission + rewards
    pub pending: Decimal,
    /// Only present once a previous cycle succeeded
    pub avg_per_day: Option<Decimal>,
    /// Same order as the account list passed to [`ChainStateAggregator::aggregate`]
    pub accounts: Vec<AccountState>,
}

impl Snapshot {
    /// One-line summary for the cycle log
    pub fn summary(&self, denom: &str) -> String {
        let mut line = format!(
            "UnstakedBalance={} {} - Pending(R&C)={} {} - Delegations={} {}",
            display(self.balance),
            denom,
            display(self.pending),
            denom,
            display(self.delegations),
            denom
        );
        if let Some(avg) = self.avg_per_day {
            line.push_str(&format!(" ({} {}/day)", display(avg), denom));
        }
        line
    }
}

/// One failed query of a cycle
#[derive(Debug)]
pub struct QueryFailure {
    pub address: String,
    pub query: &'static str,
    pub error: Error,
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} query for '{}' failed: {}", self.query, self.address, self.error)
    }
}

/// Rolling earnings estimate from consecutive `pending` values
///
/// Only the last successful `pending` is kept.
#[derive(Debug, Clone)]
pub struct EarningsTracker {
    periods_per_day: Decimal,
    previous: Option<Decimal>,
}

impl EarningsTracker {
    pub fn new(period_secs: u64) -> Self {
        let periods_per_day = Decimal::from(SECONDS_PER_DAY)
            .checked_div(Decimal::from(period_secs.max(1)))
            .unwrap_or(Decimal::ONE);
        Self {
            periods_per_day,
            previous: None,
        }
    }

    pub fn previous(&self) -> Option<Decimal> {
        self.previous
    }

    /// Store `pending` as the new baseline and return the daily estimate
    pub fn record(&mut self, pending: Decimal) -> Option<Decimal> {
        let avg = self.previous.and_then(|previous| {
            pending
                .checked_sub(previous)
                .and_then(|delta| delta.checked_mul(self.periods_per_day))
        });
        self.previous = Some(pending);
        avg
    }
}

/// Sum the entries of `denom`, `None` when there are none
fn sum_denom(coins: &[DecCoin], denom: &str) -> Result<Option<Decimal>> {
    let mut total: Option<Decimal> = None;
    for coin in coins.iter().filter(|c| c.denom == denom) {
        let value = amount::from_dec_units(&coin.amount)?;
        total = Some(
            total
                .unwrap_or_default()
                .checked_add(value)
                .ok_or_else(|| Error::Amount("sum overflow".to_string()))?,
        );
    }
    Ok(total)
}

/// Queries and sums balances, commission, rewards and delegations
pub struct ChainStateAggregator {
    client: Arc<dyn ChainClient>,
    denom: String,
    earnings: EarningsTracker,
}

impl ChainStateAggregator {
    pub fn new(client: Arc<dyn ChainClient>, denom: &str, period_secs: u64) -> Self {
        Self {
            client,
            denom: denom.to_string(),
            earnings: EarningsTracker::new(period_secs),
        }
    }

    /// Last successfully published `pending`
    pub fn previous_pending(&self) -> Option<Decimal> {
        self.earnings.previous()
    }

    /// Query every account and fold the results
    pub async fn aggregate(
        &mut self,
        accounts: &[Account],
    ) -> std::result::Result<Snapshot, Vec<QueryFailure>> {
        let results = join_all(accounts.iter().map(|a| self.query_account(a))).await;

        let mut states = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(state) => states.push(state),
                Err(mut errs) => failures.append(&mut errs),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                warn!("{}", failure);
            }
            return Err(failures);
        }

        let sum = |f: fn(&AccountState) -> Decimal| states.iter().map(f).sum::<Decimal>();
        let balance = sum(|s| s.balance);
        let commission = sum(|s| s.commission.unwrap_or_default());
        let rewards = sum(AccountState::total_rewards);
        let delegations = sum(|s| s.delegations);
        let pending = commission + rewards;
        let avg_per_day = self.earnings.record(pending);

        Ok(Snapshot {
            balance,
            commission,
            rewards,
            delegations,
            pending,
            avg_per_day,
            accounts: states,
        })
    }

    async fn query_account(
        &self,
        account: &Account,
    ) -> std::result::Result<AccountState, Vec<QueryFailure>> {
        let address = account.delegator_address();
        let mut failures = Vec::new();
        let mut state = AccountState::default();
        let mut fail = |query: &'static str, address: &str, error: Error| {
            failures.push(QueryFailure {
                address: address.to_string(),
                query,
                error,
            })
        };

        match self.query_balance(address).await {
            Ok(balance) => state.balance = balance,
            Err(e) => fail("balance", address, e),
        }

        if let Some(validator) = account.validator_address() {
            match self.query_commission(validator).await {
                Ok(commission) => state.commission = commission,
                Err(e) => fail("commission", validator, e),
            }
        }

        match self.client.delegator_validators(address).await {
            Ok(validators) => {
                for validator in validators {
                    match self.query_rewards(address, &validator).await {
                        Ok(rewards) => {
                            state.rewards.insert(validator, rewards);
                        }
                        Err(e) => fail("rewards", address, e),
                    }
                }
            }
            Err(e) => fail("bonded validators", address, e),
        }

        match self.query_delegations(address).await {
            Ok(delegations) => state.delegations = delegations,
            Err(e) => fail("delegations", address, e),
        }

        if failures.is_empty() {
            debug!(
                "{}: balance={} commission={:?} rewards={}",
                account.label(),
                display(state.balance),
                state.commission.map(display),
                display(state.total_rewards())
            );
            Ok(state)
        } else {
            Err(failures)
        }
    }

    async fn query_balance(&self, address: &str) -> Result<Decimal> {
        let coin = self.client.balance(address, &self.denom).await?;
        amount::from_native_units(&coin.amount)
    }

    async fn query_commission(&self, validator: &str) -> Result<Option<Decimal>> {
        let coins = self.client.validator_commission(validator).await?;
        sum_denom(&coins, &self.denom)
    }

    async fn query_rewards(&self, delegator: &str, validator: &str) -> Result<Option<Decimal>> {
        let coins = self.client.delegation_rewards(delegator, validator).await?;
        sum_denom(&coins, &self.denom)
    }

    /// Walk every page until the continuation key is empty
    async fn query_delegations(&self, delegator: &str) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        let mut page_key = None;
        loop {
            let page = self.client.delegations(delegator, page_key).await?;
            for delegation in &page.delegations {
                total += amount::from_dec_units(&delegation.shares)?;
            }
            if page.is_last() {
                return Ok(total);
            }
            page_key = page.next_key;
        }
    }
}
