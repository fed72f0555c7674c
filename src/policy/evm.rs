//! EVM allowlist enforcement

use super::log_rejection;
use crate::config::evm_allowlist::require_non_empty;
use crate::config::{EvmAllowlistPolicy, APPROVE_SELECTOR};
use crate::evm::{lower_hex, EvmTxParams};
use crate::{Error, Result};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function approve(address spender, uint256 amount) external returns (bool);
}

/// Checks parsed EVM transactions against an [`EvmAllowlistPolicy`].
///
/// Checks run in a fixed order and the first failure is reported:
/// chain id, value, empty calldata, selector, then either the `approve`
/// sub-policy or the destination list.
#[derive(Debug, Clone)]
pub struct EvmPolicyEngine {
    policy: EvmAllowlistPolicy,
}

impl EvmPolicyEngine {
    pub fn new(policy: EvmAllowlistPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EvmAllowlistPolicy {
        &self.policy
    }

    pub fn check(&self, tx: &EvmTxParams) -> Result<()> {
        let outcome = self.evaluate(tx);
        if let Err(err) = &outcome {
            log_rejection("evm", err);
            tracing::debug!(
                chain_id = tx.chain_id,
                to = %lower_hex(&tx.to),
                selector = %tx.selector_hex(),
                "rejected EVM transaction"
            );
        }
        outcome
    }

    fn evaluate(&self, tx: &EvmTxParams) -> Result<()> {
        let policy = &self.policy;

        require_non_empty(policy.allowed_chain_ids.is_empty(), "allowedChainIds")?;
        if !policy.allowed_chain_ids.contains(&tx.chain_id) {
            return Err(Error::denied("chainId not allowed"));
        }

        if tx.value > policy.max_value_wei {
            return Err(Error::denied("value not allowed"));
        }

        if tx.data.is_empty() {
            if !policy.allow_empty_data {
                return Err(Error::denied("empty data not allowed"));
            }
            return Ok(());
        }

        require_non_empty(policy.allowed_selectors.is_empty(), "allowedMethodSelectors")?;
        let selector = tx.selector();
        if !selector.is_some_and(|s| policy.allowed_selectors.contains(&s)) {
            return Err(Error::denied(format!(
                "method not allowed: to={} selector={}",
                lower_hex(&tx.to),
                tx.selector_hex()
            )));
        }

        // approve targets the token contract, which changes per trade, so the
        // destination list does not apply; the spender is checked instead
        if selector == Some(APPROVE_SELECTOR) {
            return self.check_approve(tx);
        }

        require_non_empty(policy.allowed_to.is_empty(), "allowedTo")?;
        if !policy.allowed_to.contains(&tx.to) {
            return Err(Error::denied(format!("to not allowed: {}", lower_hex(&tx.to))));
        }
        Ok(())
    }

    fn check_approve(&self, tx: &EvmTxParams) -> Result<()> {
        let approve = &self.policy.approve;
        if !approve.enabled {
            return Err(Error::denied("approve not allowed"));
        }

        let call = approveCall::abi_decode(&tx.data)
            .map_err(|_| Error::denied("invalid approve data"))?;

        require_non_empty(
            approve.spender_allowlist.is_empty(),
            "approve.spenderAllowlist",
        )?;
        if !approve.spender_allowlist.contains(&call.spender) {
            return Err(Error::denied("approve spender not allowed"));
        }
        if call.amount > approve.max_amount {
            return Err(Error::denied("approve amount not allowed"));
        }
        Ok(())
    }
}
