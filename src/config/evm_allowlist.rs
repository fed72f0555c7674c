//! EVM signing allowlist
//!
//! Closed sets of chains, destinations and method selectors the signer will
//! sign for. Built-in defaults cover the OKX DEX router and token-approval
//! contracts on Ethereum, BNB Chain, Arbitrum and Base.

use crate::{Error, Result};
use alloy::primitives::{address, fixed_bytes, Address, Selector, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ERC-20 `approve(address,uint256)`
pub const APPROVE_SELECTOR: Selector = fixed_bytes!("095ea7b3");

/// Policy applied to ERC-20 `approve` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovePolicy {
    pub enabled: bool,
    /// Spenders an approval may name. Must be non-empty while `enabled`.
    pub spender_allowlist: BTreeSet<Address>,
    #[serde(with = "u256_text")]
    pub max_amount: U256,
}

impl Default for ApprovePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            spender_allowlist: okx_token_approval().into_iter().collect(),
            max_amount: U256::MAX,
        }
    }
}

/// Allowlist for EVM transactions.
///
/// Missing fields in an override file fall back to the built-in defaults;
/// an explicitly empty required list is a misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvmAllowlistPolicy {
    pub allowed_chain_ids: BTreeSet<u64>,
    pub allowed_to: BTreeSet<Address>,
    #[serde(alias = "allowedMethodSelectors")]
    pub allowed_selectors: BTreeSet<Selector>,
    /// Permit calldata of `0x` / `0x0` (plain native transfers).
    pub allow_empty_data: bool,
    #[serde(with = "u256_text")]
    pub max_value_wei: U256,
    pub approve: ApprovePolicy,
}

impl Default for EvmAllowlistPolicy {
    fn default() -> Self {
        let mut allowed_to: BTreeSet<Address> = [
            // DEX router
            address!("5e1f62dac767b0491e3ce72469c217365d5b48cc"), // Ethereum
            address!("368e01160c2244b0363a35b3ff0a971e44a89284"), // Arbitrum
            address!("4409921ae43a39a11d90f7b7f96cfd0b8093d9fc"), // Base
            address!("3156020dff8d99af1ddc523ebdfb1ad2018554a0"), // BNB Chain
            // DEX router, exactOut
            address!("a875fb2204ce71679be054d97f7faffeb6536d67"), // Ethereum
            address!("9736d9a45115e33411390ebd54e5a5c3a6e25aa6"), // Arbitrum
            address!("77449ff075c0a385796da0762bcb46fd5cc884c6"), // Base
            address!("5cb43bae4f36e2f9f858232b4dce0dbe27bb85e3"), // BNB Chain
        ]
        .into_iter()
        .collect();
        // token-approval contracts can appear as `to` in some flows
        allowed_to.extend(okx_token_approval());

        let allowed_selectors = [
            APPROVE_SELECTOR,
            fixed_bytes!("0a5ea466"), // claimTokens(address,address,address,uint256)
            fixed_bytes!("01617fab"), // swapWrap
            fixed_bytes!("03b87e5f"), // smartSwapTo
            fixed_bytes!("08298b5a"), // unxswapTo
            fixed_bytes!("0d5f0e3b"), // uniswapV3SwapTo
            fixed_bytes!("44014e98"), // uniswapV3SwapToWithBaseRequest
            fixed_bytes!("591b3d08"), // smartSwapByInvestWithRefund
            fixed_bytes!("9871efa4"), // unxswapByOrderId
            fixed_bytes!("98d2ac62"), // swapWrapToWithBaseRequest
            fixed_bytes!("b80c2f09"), // smartSwapByOrderId
            fixed_bytes!("b8815477"), // unxswapToWithBaseRequest
            fixed_bytes!("f2c42696"), // dagSwapByOrderId
            fixed_bytes!("e99bfa95"), // smartSwapByInvest
        ]
        .into_iter()
        .collect();

        Self {
            allowed_chain_ids: [1, 56, 42161, 8453].into_iter().collect(),
            allowed_to,
            allowed_selectors,
            allow_empty_data: false,
            max_value_wei: U256::ZERO,
            approve: ApprovePolicy::default(),
        }
    }
}

impl EvmAllowlistPolicy {
    /// Startup check: every required list is non-empty.
    pub fn validate(&self) -> Result<()> {
        require_non_empty(self.allowed_chain_ids.is_empty(), "allowedChainIds")?;
        require_non_empty(self.allowed_selectors.is_empty(), "allowedMethodSelectors")?;
        require_non_empty(self.allowed_to.is_empty(), "allowedTo")?;
        if self.approve.enabled {
            require_non_empty(
                self.approve.spender_allowlist.is_empty(),
                "approve.spenderAllowlist",
            )?;
        }
        Ok(())
    }
}

/// Fail with a misconfiguration when a required list is empty.
pub(crate) fn require_non_empty(is_empty: bool, name: &str) -> Result<()> {
    if is_empty {
        return Err(Error::misconfigured(format!(
            "EVM allowlist misconfigured: {name} is empty"
        )));
    }
    Ok(())
}

fn okx_token_approval() -> [Address; 4] {
    [
        address!("40aa958dd87fc8305b97f2ba922cddca374bcd7f"), // Ethereum
        address!("70cbb871e8f30fc8ce23609e9e0ea87b6b222f58"), // Arbitrum
        address!("57df6092665eb6058de53939612413ff4b09114e"), // Base
        address!("2c34a2fb1d0b4f55de51e1d0bdefaddce6b7cdd6"), // BNB Chain
    ]
}

/// U256 as a decimal string on output; a JSON number, decimal string or
/// `0x` hex string on input.
mod u256_text {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        crate::evm::parse_u256(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid uint256: {value}")))
    }
}
