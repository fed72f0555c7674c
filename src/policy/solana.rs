//! Solana allowlist enforcement

use super::log_rejection;
use crate::config::SolanaAllowlistPolicy;
use crate::solana::{
    decode_tx_data, parse_transaction, Pubkey, VersionedTransaction, SIGNATURE_BYTES,
};
use crate::{Error, Result};

/// Smallest decoded payload worth parsing: one signature.
pub const MIN_TX_DATA_SIZE: usize = SIGNATURE_BYTES;

/// Checks raw Solana transactions against a [`SolanaAllowlistPolicy`].
///
/// Split in two phases so the caller can verify the claimed signer between
/// the cheap size screen and the full parse.
#[derive(Debug, Clone)]
pub struct SolanaPolicyEngine {
    policy: SolanaAllowlistPolicy,
}

impl SolanaPolicyEngine {
    pub fn new(policy: SolanaAllowlistPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SolanaAllowlistPolicy {
        &self.policy
    }

    /// Enabled flag, text decoding and size bounds. Returns the decoded bytes.
    pub fn screen(&self, tx_data: &str) -> Result<Vec<u8>> {
        let outcome = self.screen_inner(tx_data);
        if let Err(err) = &outcome {
            log_rejection("solana", err);
        }
        outcome
    }

    fn screen_inner(&self, tx_data: &str) -> Result<Vec<u8>> {
        if !self.policy.enabled {
            return Err(Error::denied("Solana signing disabled"));
        }
        let bytes = decode_tx_data(tx_data)
            .ok_or_else(|| Error::denied("Invalid Solana txData: not base58 or base64"))?;

        let max = self.policy.max_tx_data_size;
        if bytes.len() > max {
            return Err(Error::denied(format!(
                "txData too large: {} > {}",
                bytes.len(),
                max
            )));
        }
        if bytes.len() < MIN_TX_DATA_SIZE {
            return Err(Error::denied("txData too short"));
        }
        Ok(bytes)
    }

    /// Parse the transaction and check every invoked program.
    pub fn inspect(&self, bytes: &[u8]) -> Result<VersionedTransaction> {
        let outcome = parse(bytes).and_then(|tx| {
            self.check_programs(&tx)?;
            Ok(tx)
        });
        if let Err(err) = &outcome {
            log_rejection("solana", err);
        }
        outcome
    }

    /// Both phases back to back.
    pub fn check(&self, tx_data: &str) -> Result<VersionedTransaction> {
        let bytes = self.screen(tx_data)?;
        self.inspect(&bytes)
    }

    fn check_programs(&self, tx: &VersionedTransaction) -> Result<()> {
        let keys = tx.message.static_account_keys();
        let mut seen: Vec<&Pubkey> = Vec::new();
        for ix in tx.message.instructions() {
            // indexes past the static keys resolve through a lookup table we
            // cannot see, so the program is unknown
            let program = keys.get(usize::from(ix.program_id_index)).ok_or_else(|| {
                Error::denied(
                    "Transaction uses address lookup table; program ID cannot be verified",
                )
            })?;
            if !seen.contains(&program) {
                seen.push(program);
            }
        }

        for program in seen {
            let id = program.to_string();
            if !self.policy.allows_program(&id) {
                return Err(Error::denied(format!("Forbidden program: {id}")));
            }
        }
        Ok(())
    }
}

fn parse(bytes: &[u8]) -> Result<VersionedTransaction> {
    parse_transaction(bytes).map_err(|e| Error::denied(format!("Invalid Solana txData: {e}")))
}
