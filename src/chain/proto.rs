//! Protobuf messages of the Cosmos SDK transaction envelope
//!
//! Only the fields this tool emits are declared. Field numbers follow
//! `cosmos.tx.v1beta1`, `cosmos.base.v1beta1`, `cosmos.crypto.secp256k1`,
//! `cosmos.distribution.v1beta1` and `cosmos.staking.v1beta1`.

use prost::Message;

pub const TYPE_URL_MSG_WITHDRAW_DELEGATOR_REWARD: &str =
    "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward";
pub const TYPE_URL_MSG_WITHDRAW_VALIDATOR_COMMISSION: &str =
    "/cosmos.distribution.v1beta1.MsgWithdrawValidatorCommission";
pub const TYPE_URL_MSG_DELEGATE: &str = "/cosmos.staking.v1beta1.MsgDelegate";
pub const TYPE_URL_SECP256K1_PUBKEY: &str = "/cosmos.crypto.secp256k1.PubKey";

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl Any {
    /// Wrap an encoded message under its type URL
    pub fn pack<M: Message>(type_url: &str, message: &M) -> Self {
        Self {
            type_url: type_url.to_string(),
            value: message.encode_to_vec(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgWithdrawDelegatorReward {
    #[prost(string, tag = "1")]
    pub delegator_address: String,
    #[prost(string, tag = "2")]
    pub validator_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgWithdrawValidatorCommission {
    #[prost(string, tag = "1")]
    pub validator_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelegate {
    #[prost(string, tag = "1")]
    pub delegator_address: String,
    #[prost(string, tag = "2")]
    pub validator_address: String,
    #[prost(message, optional, tag = "3")]
    pub amount: Option<Coin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

/// secp256k1 public key, 33-byte compressed form
#[derive(Clone, PartialEq, Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SignMode {
    Unspecified = 0,
    Direct = 1,
}

/// `ModeInfo` with its `single` oneof arm
#[derive(Clone, PartialEq, Message)]
pub struct ModeInfo {
    #[prost(message, optional, tag = "1")]
    pub single: Option<Single>,
}

impl ModeInfo {
    pub fn single(mode: SignMode) -> Self {
        Self {
            single: Some(Single { mode: mode as i32 }),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Single {
    #[prost(enumeration = "SignMode", tag = "1")]
    pub mode: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(message, optional, tag = "2")]
    pub mode_info: Option<ModeInfo>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignDoc {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub account_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_wire_format() {
        let coin = Coin {
            denom: "FX".into(),
            amount: "5".into(),
        };
        // field 1 (len 2) "FX", field 2 (len 1) "5"
        assert_eq!(coin.encode_to_vec(), vec![0x0a, 2, b'F', b'X', 0x12, 1, b'5']);
    }

    #[test]
    fn test_mode_info_wire_format() {
        let direct = ModeInfo::single(SignMode::Direct).encode_to_vec();
        assert_eq!(direct, vec![0x0a, 2, 0x08, 1]);

        // Default enum value is omitted inside the nested message
        let unspecified = ModeInfo::single(SignMode::Unspecified).encode_to_vec();
        assert_eq!(unspecified, vec![0x0a, 0]);
    }

    #[test]
    fn test_tx_raw_decodes_back() {
        let raw = TxRaw {
            body_bytes: vec![1, 2, 3],
            auth_info_bytes: vec![4],
            signatures: vec![vec![], vec![9; 64]],
        };
        let decoded = TxRaw::decode(raw.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.signatures.len(), 2);
        assert!(decoded.signatures[0].is_empty());
    }
}
