//! EVM transaction parameters as received from callers
//!
//! Callers send loosely typed JSON: numbers may be JSON numbers, decimal
//! strings or `0x` hex strings. Everything is parsed into exact types here,
//! before any policy runs.

use crate::{Error, Result};
use alloy::consensus::{TxEip1559, TxEip2930, TxLegacy, TypedTransaction};
use alloy::primitives::{hex, Address, Bytes, Selector, TxKind, U256};
use serde_json::Value;

/// How the transaction pays for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeModel {
    /// Type 0
    Legacy { gas_price: u128 },
    /// Type 1, empty access list
    AccessList { gas_price: u128 },
    /// Type 2
    FeeMarket {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl FeeModel {
    pub fn tx_type(&self) -> u8 {
        match self {
            FeeModel::Legacy { .. } => 0,
            FeeModel::AccessList { .. } => 1,
            FeeModel::FeeMarket { .. } => 2,
        }
    }
}

/// A fully parsed, not yet approved EVM transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    /// Calldata; `0x` and `0x0` both parse to empty.
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: u64,
    pub fee: FeeModel,
}

impl EvmTxParams {
    /// Parse a caller-supplied transaction object.
    pub fn from_json(tx: &Value) -> Result<Self> {
        let obj = tx
            .as_object()
            .ok_or_else(|| Error::BadRequest("Bad tx params".to_string()))?;
        let field = |name: &str| obj.get(name).filter(|v| !v.is_null());

        let chain_id = required_u64(field("chainId"), "chainId", 1)?;
        let nonce = required_u64(field("nonce"), "nonce", 0)?;
        let to = field("to")
            .and_then(Value::as_str)
            .and_then(parse_address)
            .ok_or_else(|| invalid("to"))?;
        let data = match field("data") {
            None => Bytes::new(),
            Some(v) => v.as_str().and_then(parse_calldata).ok_or_else(|| invalid("data"))?,
        };
        let gas_limit = required_u64(field("gasLimit"), "gasLimit", 1)?;
        let value = match field("value") {
            None => U256::ZERO,
            Some(v) => parse_u256(v).ok_or_else(|| invalid("value"))?,
        };
        let tx_type = match field("type") {
            None => None,
            Some(v) => Some(parse_u64(v).ok_or_else(|| invalid("type"))?),
        };

        let fee_market =
            field("maxFeePerGas").is_some() || field("maxPriorityFeePerGas").is_some();
        let fee = if fee_market {
            let max_fee_per_gas = required_u128(field("maxFeePerGas"), "maxFeePerGas", 1)?;
            let max_priority_fee_per_gas =
                required_u128(field("maxPriorityFeePerGas"), "maxPriorityFeePerGas", 0)?;
            match tx_type.unwrap_or(2) {
                2 => FeeModel::FeeMarket {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                },
                _ => return Err(invalid("type")),
            }
        } else {
            let gas_price = required_u128(field("gasPrice"), "gasPrice", 1)?;
            match tx_type.unwrap_or(0) {
                0 => FeeModel::Legacy { gas_price },
                1 => FeeModel::AccessList { gas_price },
                _ => return Err(invalid("type")),
            }
        };

        Ok(Self {
            chain_id,
            nonce,
            to,
            data,
            value,
            gas_limit,
            fee,
        })
    }

    /// First four calldata bytes, if there are that many.
    pub fn selector(&self) -> Option<Selector> {
        self.data.get(..4).map(Selector::from_slice)
    }

    /// Selector as logged and reported: `0x` when calldata is too short.
    pub fn selector_hex(&self) -> String {
        match self.selector() {
            Some(selector) => hex::encode_prefixed(selector),
            None => "0x".to_string(),
        }
    }

    /// Unsigned consensus transaction for this request.
    pub fn to_typed_transaction(&self) -> TypedTransaction {
        let to = TxKind::Call(self.to);
        let input = self.data.clone();
        match self.fee {
            FeeModel::Legacy { gas_price } => TypedTransaction::Legacy(TxLegacy {
                chain_id: Some(self.chain_id),
                nonce: self.nonce,
                gas_price,
                gas_limit: self.gas_limit,
                to,
                value: self.value,
                input,
            }),
            FeeModel::AccessList { gas_price } => TypedTransaction::Eip2930(TxEip2930 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_price,
                gas_limit: self.gas_limit,
                to,
                value: self.value,
                input,
                ..Default::default()
            }),
            FeeModel::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => TypedTransaction::Eip1559(TxEip1559 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_limit: self.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to,
                value: self.value,
                input,
                ..Default::default()
            }),
        }
    }
}

/// Lowercase `0x` hex form of an address.
pub fn lower_hex(address: &Address) -> String {
    hex::encode_prefixed(address)
}

/// Parse an unsigned integer from a JSON number, decimal string or `0x` hex
/// string. Negative, fractional and empty values are rejected.
///
/// Float literals such as `21000.0` or `1e18` are accepted when they hold an
/// exact integer below 2^128. Larger amounts must be sent as strings.
pub fn parse_u256(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(digits) if !digits.is_empty() => U256::from_str_radix(digits, 16).ok(),
                Some(_) => None,
                None if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                    U256::from_str_radix(s, 10).ok()
                }
                None => None,
            }
        }
        _ => None,
    }
}

fn integral_f64(f: f64) -> Option<U256> {
    let in_range = f.is_finite() && f >= 0.0 && f < 2f64.powi(128);
    (in_range && f.fract() == 0.0).then(|| U256::from(f as u128))
}

pub fn parse_u64(value: &Value) -> Option<u64> {
    parse_u256(value).and_then(|v| u64::try_from(v).ok())
}

fn parse_u128(value: &Value) -> Option<u128> {
    parse_u256(value).and_then(|v| u128::try_from(v).ok())
}

/// Parse a 20-byte hex address. Mixed-case input must carry a valid
/// EIP-55 checksum.
pub fn parse_address(text: &str) -> Option<Address> {
    let text = text.trim();
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        return Address::parse_checksummed(format!("0x{digits}"), None).ok();
    }
    digits.parse().ok()
}

fn parse_calldata(text: &str) -> Option<Bytes> {
    let digits = text.strip_prefix("0x")?;
    if digits.is_empty() || digits == "0" {
        return Some(Bytes::new());
    }
    hex::decode(digits).ok().map(Bytes::from)
}

fn invalid(name: &str) -> Error {
    Error::BadRequest(format!("Invalid {name}"))
}

fn missing(name: &str) -> Error {
    Error::BadRequest(format!("Missing {name}"))
}

fn required_u64(value: Option<&Value>, name: &str, min: u64) -> Result<u64> {
    let value = value.ok_or_else(|| missing(name))?;
    parse_u64(value)
        .filter(|v| *v >= min)
        .ok_or_else(|| invalid(name))
}

fn required_u128(value: Option<&Value>, name: &str, min: u128) -> Result<u128> {
    let value = value.ok_or_else(|| missing(name))?;
    parse_u128(value)
        .filter(|v| *v >= min)
        .ok_or_else(|| invalid(name))
}
