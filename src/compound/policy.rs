//! Withdrawal selection

use rust_decimal::Decimal;

use super::aggregator::AccountState;
use crate::wallet::Account;

/// Thresholds shared by the policy and the transaction builder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalPolicy {
    pub minimum_withdraw: Decimal,
    pub keep_unstaked: Decimal,
}

impl WithdrawalPolicy {
    pub fn new(minimum_withdraw: Decimal, keep_unstaked: Decimal) -> Self {
        Self {
            minimum_withdraw,
            keep_unstaked,
        }
    }

    /// Commission (validators only) plus rewards, minus the reserve
    pub fn account_pending(&self, account: &Account, state: &AccountState) -> Decimal {
        let commission = if account.is_validator() {
            state.commission.unwrap_or_default()
        } else {
            Decimal::ZERO
        };
        commission + state.total_rewards() - self.keep_unstaked
    }

    /// Strictly above the minimum
    pub fn is_selected(&self, account: &Account, state: &AccountState) -> bool {
        self.account_pending(account, state) > self.minimum_withdraw
    }

    /// Whether a restake amount is worth a delegation message
    pub fn should_restake(&self, amount: Decimal) -> bool {
        amount > self.minimum_withdraw
    }
}
