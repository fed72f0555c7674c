//! Transaction policy engines
//!
//! Every transaction is checked against a closed allowlist before the key is
//! touched. Denials are client errors (400); an allowlist that cannot be
//! evaluated because a required list is empty is a server error (500).

pub mod evm;
pub mod solana;

pub use evm::EvmPolicyEngine;
pub use solana::SolanaPolicyEngine;

use crate::Error;

/// Log a rejected transaction at a level matching its cause.
fn log_rejection(chain: &'static str, err: &Error) {
    match err {
        Error::Misconfiguration(reason) => {
            tracing::error!(event = "policy_misconfigured", chain, reason = %reason);
        }
        other => {
            tracing::warn!(event = "policy_denied", chain, reason = %other);
        }
    }
}
