//! Solana signing allowlist

use crate::solana::{Pubkey, DEFAULT_MAX_TX_DATA_SIZE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allowlist for Solana transactions.
///
/// Program ids are compared as base58 text. An empty `allowed_program_ids`
/// admits every program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolanaAllowlistPolicy {
    pub enabled: bool,
    /// Upper bound on decoded transaction bytes.
    pub max_tx_data_size: usize,
    pub allowed_program_ids: BTreeSet<String>,
}

impl Default for SolanaAllowlistPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tx_data_size: DEFAULT_MAX_TX_DATA_SIZE,
            allowed_program_ids: [
                "11111111111111111111111111111111",              // System
                "ComputeBudget111111111111111111111111111111",   // Compute Budget
                "ComputeBudget11111111111111111111111111111111", // Compute Budget (alt spelling)
                "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",  // Associated Token
                "proVF4pMXVaYqmy4NjniPh4pqKNfMmsihgd4wdkCX3u",   // OKX DEX router
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl SolanaAllowlistPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_tx_data_size == 0 {
            return Err(Error::misconfigured(
                "Solana allowlist misconfigured: maxTxDataSize must be positive",
            ));
        }
        for id in &self.allowed_program_ids {
            if id.trim().parse::<Pubkey>().is_err() {
                tracing::warn!(program_id = %id, "allowlisted program id is not a valid public key and can never match");
            }
        }
        Ok(())
    }

    /// Whether `program_id` may be invoked.
    pub fn allows_program(&self, program_id: &str) -> bool {
        let mut ids = self
            .allowed_program_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .peekable();
        if ids.peek().is_none() {
            return true;
        }
        ids.any(|id| id == program_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_system_program() {
        let policy = SolanaAllowlistPolicy::default();
        policy.validate().unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.max_tx_data_size, 1280);
        assert!(policy.allows_program("11111111111111111111111111111111"));
        assert!(!policy.allows_program("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
    }

    #[test]
    fn empty_list_allows_everything() {
        let policy = SolanaAllowlistPolicy {
            allowed_program_ids: BTreeSet::from([" ".to_string()]),
            ..Default::default()
        };
        assert!(policy.allows_program("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
    }

    #[test]
    fn zero_size_limit_is_rejected() {
        let policy = SolanaAllowlistPolicy {
            max_tx_data_size: 0,
            ..Default::default()
        };
        assert_eq!(policy.validate().unwrap_err().status_code(), 500);
    }

    #[test]
    fn override_file_fields_are_camel_case() {
        let policy: SolanaAllowlistPolicy = serde_json::from_value(serde_json::json!({
            "enabled": false,
            "maxTxDataSize": 512
        }))
        .unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.max_tx_data_size, 512);
        assert_eq!(policy.allowed_program_ids.len(), 5);
    }
}
