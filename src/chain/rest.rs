//! REST (gRPC-gateway) chain client
//!
//! Cosmos SDK nodes expose every gRPC query under `/cosmos/...` on the API
//! port (default 1317). Numbers that do not fit a JSON double (`uint64`,
//! `Int`, `Dec`) come back as strings. A `Dec` amount is a native-unit
//! value rendered with 18 decimals; dropping the point yields the raw
//! 36-exponent integer form the rest of the crate works with.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::amount::NATIVE_EXPONENT;
use crate::error::{Error, Result};

use super::{
    AccountInfo, BroadcastMode, BroadcastResult, ChainClient, Coin, DecCoin, Delegation,
    DelegationPage, NodeInfo,
};

/// `@type` of a plain account
pub const BASE_ACCOUNT_TYPE: &str = "/cosmos.auth.v1beta1.BaseAccount";

/// Chain client over the node's REST API
pub struct RestChainClient {
    client: Client,
    base_url: String,
}

impl RestChainClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {}", path);
        let resp = self.client.get(self.url(path)).query(query).send().await?;
        decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!("POST {}", path);
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        decode(resp).await
    }
}

/// Error body of the gRPC gateway
#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let detail = serde_json::from_str::<GatewayError>(&body)
            .map(|e| format!("code {}: {}", e.code, e.message))
            .unwrap_or(body);
        return Err(Error::Rpc(format!("HTTP {}: {}", status, detail)));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Convert a `Dec` string (`"12.5"`) to its raw 36-exponent integer string
pub fn dec_to_raw(value: &str) -> Result<String> {
    let value = value.trim();
    let (int_part, frac_part) = value.split_once('.').unwrap_or((value, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(Error::Deserialization(format!("invalid Dec value: {:?}", value)));
    }

    let places = NATIVE_EXPONENT as usize;
    let mut frac: String = frac_part.chars().take(places).collect();
    while frac.len() < places {
        frac.push('0');
    }

    let raw = format!("{}{}", int_part, frac);
    let trimmed = raw.trim_start_matches('0');
    Ok(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

fn parse_u64(field: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Deserialization(format!("{} is not a u64: {:?}", field, value)))
}

#[derive(Debug, Deserialize)]
struct JsonDecCoin {
    denom: String,
    amount: String,
}

impl JsonDecCoin {
    fn into_dec_coin(self) -> Result<DecCoin> {
        Ok(DecCoin::new(self.denom, dec_to_raw(&self.amount)?))
    }
}

fn dec_coins(coins: Vec<JsonDecCoin>) -> Result<Vec<DecCoin>> {
    coins.into_iter().map(JsonDecCoin::into_dec_coin).collect()
}

#[derive(Debug, Deserialize)]
struct NodeInfoResponse {
    default_node_info: DefaultNodeInfo,
    #[serde(default)]
    application_version: Option<ApplicationVersion>,
}

#[derive(Debug, Deserialize)]
struct DefaultNodeInfo {
    #[serde(default)]
    network: String,
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationVersion {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Option<Coin>,
}

#[derive(Debug, Deserialize)]
struct CommissionResponse {
    commission: Option<CommissionBody>,
}

#[derive(Debug, Deserialize)]
struct CommissionBody {
    #[serde(default)]
    commission: Vec<JsonDecCoin>,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResponse {
    #[serde(default)]
    validators: Vec<ValidatorEntry>,
}

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
    operator_address: String,
}

#[derive(Debug, Deserialize)]
struct RewardsResponse {
    #[serde(default)]
    rewards: Vec<JsonDecCoin>,
}

#[derive(Debug, Deserialize)]
struct DelegationsResponse {
    #[serde(default)]
    delegation_responses: Vec<DelegationResponse>,
    pagination: Option<PageResponse>,
}

#[derive(Debug, Deserialize)]
struct DelegationResponse {
    delegation: DelegationBody,
}

#[derive(Debug, Deserialize)]
struct DelegationBody {
    validator_address: String,
    shares: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    next_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BaseAccountBody {
    #[serde(rename = "@type")]
    type_url: String,
    #[serde(default)]
    account_number: String,
    #[serde(default)]
    sequence: String,
}

#[derive(Debug, Serialize)]
struct SimulateRequest {
    tx_bytes: String,
}

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    gas_info: Option<GasInfo>,
}

#[derive(Debug, Deserialize)]
struct GasInfo {
    #[serde(default)]
    gas_used: String,
}

#[derive(Debug, Serialize)]
struct BroadcastRequest {
    tx_bytes: String,
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    tx_response: TxResponse,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    height: String,
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default)]
    gas_used: String,
}

fn parse_delegations(resp: DelegationsResponse) -> Result<DelegationPage> {
    let delegations = resp
        .delegation_responses
        .into_iter()
        .map(|d| {
            Ok(Delegation {
                validator_address: d.delegation.validator_address,
                shares: dec_to_raw(&d.delegation.shares)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let next_key = match resp.pagination.and_then(|p| p.next_key) {
        Some(key) if !key.is_empty() => Some(
            STANDARD
                .decode(key)
                .map_err(|e| Error::Deserialization(format!("pagination key: {}", e)))?,
        ),
        _ => None,
    };

    Ok(DelegationPage {
        delegations,
        next_key,
    })
}

fn parse_account(address: &str, resp: AccountResponse) -> Result<AccountInfo> {
    let body: BaseAccountBody = serde_json::from_value(resp.account)?;
    if body.type_url != BASE_ACCOUNT_TYPE {
        return Err(Error::UnexpectedAccountType {
            address: address.to_string(),
            type_url: body.type_url,
        });
    }

    Ok(AccountInfo {
        account_number: parse_u64("account_number", &body.account_number)?,
        sequence: parse_u64("sequence", &body.sequence)?,
    })
}

fn parse_broadcast(resp: BroadcastResponse) -> Result<BroadcastResult> {
    let tx = resp.tx_response;
    let height = if tx.height.is_empty() {
        0
    } else {
        tx.height
            .parse()
            .map_err(|_| Error::Deserialization(format!("height is not an integer: {:?}", tx.height)))?
    };
    let gas_used = if tx.gas_used.is_empty() {
        0
    } else {
        parse_u64("gas_used", &tx.gas_used)?
    };

    Ok(BroadcastResult {
        tx_hash: tx.txhash,
        height,
        gas_used,
        code: tx.code,
        raw_log: tx.raw_log,
    })
}

#[async_trait::async_trait]
impl ChainClient for RestChainClient {
    async fn node_info(&self) -> Result<NodeInfo> {
        let resp: NodeInfoResponse = self
            .get("/cosmos/base/tendermint/v1beta1/node_info")
            .await
            .map_err(|e| match e {
                Error::Rpc(msg) => Error::RpcConnection(msg),
                other => other,
            })?;

        Ok(NodeInfo {
            network: resp.default_node_info.network,
            moniker: resp.default_node_info.moniker,
            version: resp.application_version.map(|v| v.version).unwrap_or_default(),
        })
    }

    async fn balance(&self, address: &str, denom: &str) -> Result<Coin> {
        let resp: BalanceResponse = self
            .get_with_query(
                &format!("/cosmos/bank/v1beta1/balances/{}/by_denom", address),
                &[("denom", denom.to_string())],
            )
            .await?;

        Ok(resp.balance.unwrap_or_else(|| Coin {
            denom: denom.to_string(),
            amount: "0".to_string(),
        }))
    }

    async fn validator_commission(&self, validator_address: &str) -> Result<Vec<DecCoin>> {
        let resp: CommissionResponse = self
            .get(&format!(
                "/cosmos/distribution/v1beta1/validators/{}/commission",
                validator_address
            ))
            .await?;

        dec_coins(resp.commission.map(|c| c.commission).unwrap_or_default())
    }

    async fn delegator_validators(&self, delegator_address: &str) -> Result<Vec<String>> {
        let resp: ValidatorsResponse = self
            .get(&format!(
                "/cosmos/staking/v1beta1/delegators/{}/validators",
                delegator_address
            ))
            .await?;

        Ok(resp
            .validators
            .into_iter()
            .map(|v| v.operator_address)
            .collect())
    }

    async fn delegation_rewards(
        &self,
        delegator_address: &str,
        validator_address: &str,
    ) -> Result<Vec<DecCoin>> {
        let resp: RewardsResponse = self
            .get(&format!(
                "/cosmos/distribution/v1beta1/delegators/{}/rewards/{}",
                delegator_address, validator_address
            ))
            .await?;

        dec_coins(resp.rewards)
    }

    async fn delegations(
        &self,
        delegator_address: &str,
        page_key: Option<Vec<u8>>,
    ) -> Result<DelegationPage> {
        let query: Vec<(&str, String)> = page_key
            .filter(|k| !k.is_empty())
            .map(|k| vec![("pagination.key", STANDARD.encode(k))])
            .unwrap_or_default();

        let resp: DelegationsResponse = self
            .get_with_query(
                &format!("/cosmos/staking/v1beta1/delegations/{}", delegator_address),
                &query,
            )
            .await?;

        parse_delegations(resp)
    }

    async fn account(&self, address: &str) -> Result<AccountInfo> {
        let resp: AccountResponse = self
            .get(&format!("/cosmos/auth/v1beta1/accounts/{}", address))
            .await?;

        parse_account(address, resp)
    }

    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64> {
        let request = SimulateRequest {
            tx_bytes: STANDARD.encode(tx_bytes),
        };

        let resp: SimulateResponse = self
            .post("/cosmos/tx/v1beta1/simulate", &request)
            .await
            .map_err(|e| Error::TransactionSimulation(e.to_string()))?;

        let gas_used = resp
            .gas_info
            .map(|g| g.gas_used)
            .ok_or_else(|| Error::TransactionSimulation("response carries no gas info".to_string()))?;

        parse_u64("gas_used", &gas_used)
    }

    async fn broadcast(&self, mode: BroadcastMode, tx_bytes: Vec<u8>) -> Result<BroadcastResult> {
        let request = BroadcastRequest {
            tx_bytes: STANDARD.encode(tx_bytes),
            mode: mode.as_str(),
        };

        let resp: BroadcastResponse = self
            .post("/cosmos/tx/v1beta1/txs", &request)
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))?;

        parse_broadcast(resp)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dec_to_raw() {
        assert_eq!(
            dec_to_raw("120.000000000000000000").unwrap(),
            format!("120{}", "0".repeat(18))
        );
        assert_eq!(dec_to_raw("0.5").unwrap(), format!("5{}", "0".repeat(17)));
        assert_eq!(dec_to_raw("0.000000000000000000").unwrap(), "0");
        assert_eq!(dec_to_raw("7").unwrap(), format!("7{}", "0".repeat(18)));
        assert!(dec_to_raw("-1.0").is_err());
        assert!(dec_to_raw("abc").is_err());
    }

    #[test]
    fn test_dec_round_trips_through_amount() {
        // 60.1234 tokens = 60.1234e18 native units, rendered as a Dec
        let raw = dec_to_raw("60123400000000000000.500000000000000000").unwrap();
        let tokens = crate::amount::from_dec_units(&raw).unwrap();
        assert_eq!(tokens.normalize().to_string(), "60.1234");
    }

    #[test]
    fn test_parse_delegations_page() {
        let json = r#"{
            "delegation_responses": [
                {
                    "delegation": {
                        "delegator_address": "fx1abc",
                        "validator_address": "fxvaloper1xyz",
                        "shares": "1000.000000000000000000"
                    },
                    "balance": {"denom": "FX", "amount": "1000000000000000000000"}
                }
            ],
            "pagination": {"next_key": "AQI=", "total": "2"}
        }"#;

        let page = parse_delegations(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(page.delegations.len(), 1);
        assert_eq!(page.delegations[0].validator_address, "fxvaloper1xyz");
        assert_eq!(page.next_key, Some(vec![1, 2]));
        assert!(!page.is_last());

        let last = r#"{"delegation_responses": [], "pagination": {"next_key": null, "total": "0"}}"#;
        let page = parse_delegations(serde_json::from_str(last).unwrap()).unwrap();
        assert!(page.is_last());
    }

    #[test]
    fn test_parse_base_account() {
        let json = r#"{"account": {
            "@type": "/cosmos.auth.v1beta1.BaseAccount",
            "address": "fx1abc",
            "pub_key": null,
            "account_number": "42",
            "sequence": "7"
        }}"#;

        let info = parse_account("fx1abc", serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(
            info,
            AccountInfo {
                account_number: 42,
                sequence: 7
            }
        );
    }

    #[test]
    fn test_rejects_module_account() {
        let json = r#"{"account": {
            "@type": "/cosmos.auth.v1beta1.ModuleAccount",
            "base_account": {},
            "name": "distribution"
        }}"#;

        let result = parse_account("fx1abc", serde_json::from_str(json).unwrap());
        assert!(matches!(result, Err(Error::UnexpectedAccountType { .. })));
    }

    #[test]
    fn test_parse_broadcast_rejection() {
        let json = r#"{"tx_response": {
            "height": "0",
            "txhash": "DEADBEEF",
            "code": 32,
            "raw_log": "account sequence mismatch, expected 8, got 7",
            "gas_used": "0"
        }}"#;

        let result = parse_broadcast(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(result.tx_hash, "DEADBEEF");
        assert!(result.into_result().unwrap_err().is_sequence_mismatch());
    }

    #[test]
    fn test_trailing_slash_endpoint() {
        let client = RestChainClient::new("http://127.0.0.1:1317/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/cosmos/auth/v1beta1/accounts/fx1"),
            "http://127.0.0.1:1317/cosmos/auth/v1beta1/accounts/fx1"
        );
    }
}
