//! Two-pass withdraw-and-restake transactions
//!
//! 1. Simulate: zero fee, placeholder signer infos (empty key,
//!    `SIGN_MODE_UNSPECIFIED`, empty signatures) to learn the gas used.
//! 2. Execute: re-query account numbers and sequences, rebuild the same
//!    messages, charge `ceil(gas x 1.2) x gas_unit_cost` against the first
//!    selected account's restake, sign and broadcast synchronously.
//!
//! Sequences are read again for the execute pass. If they moved in between
//! (an unrelated transaction from the same account), the envelope may be
//! rejected with a sequence mismatch; that is reported, not retried.

use std::sync::Arc;

use chrono::Utc;
use prost::Message;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::amount::{self, display};
use crate::chain::proto::{
    self, Any, AuthInfo, Fee, ModeInfo, MsgDelegate, MsgWithdrawDelegatorReward,
    MsgWithdrawValidatorCommission, PubKey, SignMode, SignerInfo, TxBody, TxRaw,
};
use crate::chain::{AccountInfo, BroadcastMode, BroadcastResult, ChainClient};
use crate::compound::aggregator::AccountState;
use crate::compound::policy::WithdrawalPolicy;
use crate::error::{Error, Result};
use crate::wallet::Account;

use super::signer::{SignerRef, TransactionSigner};

/// Smallest withdrawal worth a message, in tokens (exclusive)
fn min_message_amount() -> Decimal {
    Decimal::ONE
}

/// Safety margin applied to simulated gas
pub fn gas_coefficient() -> Decimal {
    Decimal::new(12, 1)
}

/// One message of a compounding transaction, amounts in tokens
#[derive(Debug, Clone, PartialEq)]
pub enum TxMessage {
    WithdrawCommission {
        validator: String,
        amount: Decimal,
    },
    WithdrawRewards {
        delegator: String,
        validator: String,
        amount: Decimal,
    },
    Delegate {
        delegator: String,
        validator: String,
        amount: Decimal,
    },
}

impl TxMessage {
    pub fn is_withdrawal(&self) -> bool {
        !matches!(self, TxMessage::Delegate { .. })
    }

    pub fn amount(&self) -> Decimal {
        match self {
            TxMessage::WithdrawCommission { amount, .. }
            | TxMessage::WithdrawRewards { amount, .. }
            | TxMessage::Delegate { amount, .. } => *amount,
        }
    }

    fn to_any(&self, denom: &str) -> Result<Any> {
        Ok(match self {
            TxMessage::WithdrawCommission { validator, .. } => Any::pack(
                proto::TYPE_URL_MSG_WITHDRAW_VALIDATOR_COMMISSION,
                &MsgWithdrawValidatorCommission {
                    validator_address: validator.clone(),
                },
            ),
            TxMessage::WithdrawRewards {
                delegator,
                validator,
                ..
            } => Any::pack(
                proto::TYPE_URL_MSG_WITHDRAW_DELEGATOR_REWARD,
                &MsgWithdrawDelegatorReward {
                    delegator_address: delegator.clone(),
                    validator_address: validator.clone(),
                },
            ),
            TxMessage::Delegate {
                delegator,
                validator,
                amount,
            } => Any::pack(
                proto::TYPE_URL_MSG_DELEGATE,
                &MsgDelegate {
                    delegator_address: delegator.clone(),
                    validator_address: validator.clone(),
                    amount: Some(proto::Coin {
                        denom: denom.to_string(),
                        amount: amount::to_native_units(*amount)?,
                    }),
                },
            ),
        })
    }

    fn describe(&self, denom: &str) -> String {
        match self {
            TxMessage::WithdrawCommission { validator, amount } => format!(
                "Withdraw validator commission for validator '{}' : {} {}",
                validator,
                display(*amount),
                denom
            ),
            TxMessage::WithdrawRewards {
                delegator,
                validator,
                amount,
            } => format!(
                "Withdraw delegator rewards for delegator '{}' on validator '{}' : {} {}",
                delegator,
                validator,
                display(*amount),
                denom
            ),
            TxMessage::Delegate {
                delegator,
                validator,
                amount,
            } => format!(
                "Delegate for delegator '{}' on validator '{}' : {} {}",
                delegator,
                validator,
                display(*amount),
                denom
            ),
        }
    }
}

/// Gas sizing derived from a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub simulated: u64,
    pub gas_limit: u64,
    /// Fee in native units
    pub fee: u128,
}

impl GasPlan {
    pub fn from_simulation(simulated: u64, gas_unit_cost: u64) -> Result<Self> {
        let gas_limit = (Decimal::from(simulated) * gas_coefficient())
            .ceil()
            .to_u64()
            .ok_or_else(|| Error::TransactionBuild(format!("gas limit overflow for {}", simulated)))?;

        let fee = (gas_limit as u128)
            .checked_mul(gas_unit_cost as u128)
            .ok_or_else(|| Error::TransactionBuild("fee overflow".to_string()))?;

        Ok(Self {
            simulated,
            gas_limit,
            fee,
        })
    }

    /// Fee in tokens
    pub fn fee_tokens(&self) -> Result<Decimal> {
        amount::native_units_to_decimal(self.fee)
    }
}

/// A required signer with the account data read for this pass
#[derive(Debug)]
pub struct SignerSlot<'a> {
    pub account: &'a Account,
    pub info: AccountInfo,
}

/// Messages and signers of one pass
#[derive(Debug)]
pub struct PendingTransaction<'a> {
    pub messages: Vec<TxMessage>,
    pub signers: Vec<SignerSlot<'a>>,
}

impl PendingTransaction<'_> {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// What a broadcast transaction did
#[derive(Debug, Clone)]
pub struct CompoundOutcome {
    pub messages: usize,
    pub gas: GasPlan,
    pub result: BroadcastResult,
    /// gas actually used x gas unit cost, in tokens
    pub actual_fee: Decimal,
}

/// Static transaction parameters
#[derive(Debug, Clone)]
pub struct TxSettings {
    pub chain_id: String,
    pub denom: String,
    pub target_validator: String,
    pub gas_unit_cost: u64,
    pub memo: String,
}

/// Builds, simulates, signs and broadcasts compounding transactions
pub struct TransactionBuilder {
    client: Arc<dyn ChainClient>,
    signer: TransactionSigner,
    settings: TxSettings,
    policy: WithdrawalPolicy,
}

impl TransactionBuilder {
    pub fn new(client: Arc<dyn ChainClient>, settings: TxSettings, policy: WithdrawalPolicy) -> Self {
        Self {
            client,
            signer: TransactionSigner::new(&settings.chain_id),
            settings,
            policy,
        }
    }

    /// Messages of one account for this pass
    ///
    /// `fee` (tokens) is taken out of the restake amount before the
    /// minimum check.
    pub fn account_messages(&self, account: &Account, state: &AccountState, fee: Decimal) -> Vec<TxMessage> {
        let mut messages = Vec::new();
        let mut withdrawn = Decimal::ZERO;

        if let (Some(validator), Some(commission)) = (account.validator_address(), state.commission) {
            if commission > min_message_amount() {
                messages.push(TxMessage::WithdrawCommission {
                    validator: validator.to_string(),
                    amount: commission,
                });
                withdrawn += commission;
            }
        }

        for (validator, rewards) in &state.rewards {
            if let Some(rewards) = rewards.filter(|r| *r > min_message_amount()) {
                messages.push(TxMessage::WithdrawRewards {
                    delegator: account.delegator_address().to_string(),
                    validator: validator.clone(),
                    amount: rewards,
                });
                withdrawn += rewards;
            }
        }

        let restake = withdrawn - self.policy.keep_unstaked - fee;
        if self.policy.should_restake(restake) {
            messages.push(TxMessage::Delegate {
                delegator: account.delegator_address().to_string(),
                validator: self.settings.target_validator.clone(),
                amount: restake,
            });
        }

        messages
    }

    /// Query account data and assemble the messages of one pass
    async fn prepare<'a>(
        &self,
        selected: &[(&'a Account, &AccountState)],
        fee: Decimal,
    ) -> Result<PendingTransaction<'a>> {
        let mut pending = PendingTransaction {
            messages: Vec::new(),
            signers: Vec::new(),
        };

        for (position, &(account, state)) in selected.iter().enumerate() {
            let info = self.client.account(account.delegator_address()).await.map_err(|e| {
                Error::TransactionBuild(format!("account query failed for {}: {}", account.label(), e))
            })?;

            let fee_share = if position == 0 { fee } else { Decimal::ZERO };
            let messages = self.account_messages(account, state, fee_share);

            if messages.iter().any(TxMessage::is_withdrawal) {
                pending.signers.push(SignerSlot { account, info });
            }
            pending.messages.extend(messages);
        }

        Ok(pending)
    }

    fn body_bytes(&self, messages: &[TxMessage], memo: String) -> Result<Vec<u8>> {
        let messages = messages
            .iter()
            .map(|m| m.to_any(&self.settings.denom))
            .collect::<Result<Vec<_>>>()?;

        Ok(TxBody {
            messages,
            memo,
            timeout_height: 0,
        }
        .encode_to_vec())
    }

    fn fee(&self, amount: u128, gas_limit: u64) -> Fee {
        Fee {
            amount: vec![proto::Coin {
                denom: self.settings.denom.clone(),
                amount: amount.to_string(),
            }],
            gas_limit,
            payer: String::new(),
            granter: String::new(),
        }
    }

    /// Unsigned envelope for gas estimation
    pub fn simulation_envelope(&self, pending: &PendingTransaction<'_>) -> Result<Vec<u8>> {
        let signer_infos = pending
            .signers
            .iter()
            .map(|slot| SignerInfo {
                public_key: Some(Any::pack(
                    proto::TYPE_URL_SECP256K1_PUBKEY,
                    &PubKey { key: Vec::new() },
                )),
                mode_info: Some(ModeInfo::single(SignMode::Unspecified)),
                sequence: slot.info.sequence,
            })
            .collect();

        let auth_info = AuthInfo {
            signer_infos,
            fee: Some(self.fee(0, 0)),
        };

        Ok(TxRaw {
            body_bytes: self.body_bytes(&pending.messages, self.settings.memo.clone())?,
            auth_info_bytes: auth_info.encode_to_vec(),
            signatures: vec![Vec::new(); pending.signers.len()],
        }
        .encode_to_vec())
    }

    /// Signed envelope for broadcast
    pub fn execution_envelope(&self, pending: &PendingTransaction<'_>, gas: &GasPlan) -> Result<Vec<u8>> {
        let signer_infos = pending
            .signers
            .iter()
            .map(|slot| SignerInfo {
                public_key: Some(Any::pack(
                    proto::TYPE_URL_SECP256K1_PUBKEY,
                    &PubKey {
                        key: slot.account.public_key(),
                    },
                )),
                mode_info: Some(ModeInfo::single(SignMode::Direct)),
                sequence: slot.info.sequence,
            })
            .collect();

        let auth_info_bytes = AuthInfo {
            signer_infos,
            fee: Some(self.fee(gas.fee, gas.gas_limit)),
        }
        .encode_to_vec();

        let memo = format!("{} : {}", self.settings.memo, Utc::now().to_rfc3339());
        let body_bytes = self.body_bytes(&pending.messages, memo)?;

        let signers: Vec<SignerRef<'_>> = pending
            .signers
            .iter()
            .map(|slot| SignerRef {
                key: slot.account.signing_key(),
                account_number: slot.info.account_number,
            })
            .collect();
        let signatures = self.signer.sign_all(&signers, &body_bytes, &auth_info_bytes)?;

        Ok(TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures,
        }
        .encode_to_vec())
    }

    fn log_messages(&self, pending: &PendingTransaction<'_>) {
        for message in &pending.messages {
            info!("TX : Adding {}", message.describe(&self.settings.denom));
        }
    }

    /// Run simulate then execute for the selected accounts
    ///
    /// Returns `None` when no account has anything worth a message.
    pub async fn compound(
        &self,
        selected: &[(&Account, &AccountState)],
    ) -> Result<Option<CompoundOutcome>> {
        info!("Simulating gas for transaction");
        let simulation = self.prepare(selected, Decimal::ZERO).await?;
        if simulation.is_empty() {
            info!("No withdrawal above the per-message minimum, nothing to send");
            return Ok(None);
        }
        debug!(
            "Simulation: {} message(s), {} signer(s)",
            simulation.messages.len(),
            simulation.signers.len()
        );

        let envelope = self.simulation_envelope(&simulation)?;
        let simulated = self.client.simulate(envelope).await.map_err(|e| match e {
            Error::TransactionSimulation(_) => e,
            other => Error::TransactionSimulation(other.to_string()),
        })?;

        let gas = GasPlan::from_simulation(simulated, self.settings.gas_unit_cost)?;
        let fee_tokens = gas.fee_tokens()?;
        info!(
            "Total gas required : {} (limit {}) --> {} {}",
            gas.simulated,
            gas.gas_limit,
            display(fee_tokens),
            self.settings.denom
        );

        info!("Executing transaction");
        let execution = self.prepare(selected, fee_tokens).await?;
        warn_on_sequence_change(&simulation, &execution);
        self.log_messages(&execution);

        let envelope = self.execution_envelope(&execution, &gas)?;
        let result = match self.client.broadcast(BroadcastMode::Sync, envelope).await {
            Ok(result) => result,
            Err(e) if e.is_sequence_mismatch() => {
                warn!("Transaction rejected: account sequence changed before broadcast ({})", e);
                return Err(e);
            }
            Err(e @ Error::BroadcastRejected { .. }) => return Err(e),
            Err(Error::TransactionSend(msg)) => return Err(Error::TransactionSend(msg)),
            Err(other) => return Err(Error::TransactionSend(other.to_string())),
        };

        let actual_fee = amount::native_units_to_decimal(
            (result.gas_used as u128).saturating_mul(self.settings.gas_unit_cost as u128),
        )?;

        info!("Transaction hash: {}", result.tx_hash);
        info!("Block height    : {}", result.height);
        info!("Transaction log : {}", result.raw_log);
        info!(
            "Transaction fee : {} {} ({} gas used)",
            display(actual_fee),
            self.settings.denom,
            result.gas_used
        );

        Ok(Some(CompoundOutcome {
            messages: execution.messages.len(),
            gas,
            result,
            actual_fee,
        }))
    }
}

fn warn_on_sequence_change(simulation: &PendingTransaction<'_>, execution: &PendingTransaction<'_>) {
    for slot in &execution.signers {
        let before = simulation
            .signers
            .iter()
            .find(|s| s.account == slot.account)
            .map(|s| s.info.sequence);

        if let Some(before) = before.filter(|b| *b != slot.info.sequence) {
            warn!(
                "Sequence of {} moved from {} to {} since simulation",
                slot.account.label(),
                before,
                slot.info.sequence
            );
        }
    }
}
