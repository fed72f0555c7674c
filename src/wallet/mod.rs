//! Key custody
//!
//! One seed phrase yields one EVM key and one Solana keypair. Both are
//! derived at most once per process and never leave this module except
//! through signing calls.

mod signer;
mod slip10;
mod solana_keypair;

pub use signer::{SecureWallet, SignedEvmTransaction, EVM_ACCOUNT_INDEX};
pub use solana_keypair::{SolanaKeypair, SOLANA_DERIVATION_PATH};

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

/// Strip whitespace and one pair of matching surrounding quotes, so
/// `MNEMONIC="word word ..."` in a `.env` file works.
pub fn normalize_mnemonic(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

/// Lazily derived, memoized signing keys.
///
/// Concurrent first calls share a single derivation.
pub struct KeyProvider {
    mnemonic: SecretString,
    evm: OnceCell<SecureWallet>,
    solana: OnceCell<SolanaKeypair>,
}

impl KeyProvider {
    pub fn new(mnemonic: SecretString) -> Self {
        Self {
            mnemonic,
            evm: OnceCell::new(),
            solana: OnceCell::new(),
        }
    }

    /// Derive both keys now so a bad phrase fails at startup.
    pub async fn init(&self) -> Result<()> {
        self.evm().await?;
        self.solana().await?;
        Ok(())
    }

    pub async fn evm(&self) -> Result<&SecureWallet> {
        self.evm
            .get_or_try_init(|| async {
                let wallet =
                    SecureWallet::from_mnemonic(&normalize_mnemonic(self.mnemonic.expose_secret()))?;
                tracing::info!(address = %wallet.address_string(), "derived EVM signer");
                Ok::<_, Error>(wallet)
            })
            .await
    }

    pub async fn solana(&self) -> Result<&SolanaKeypair> {
        self.solana
            .get_or_try_init(|| async {
                let phrase = Zeroizing::new(normalize_mnemonic(self.mnemonic.expose_secret()));
                let mnemonic = bip39::Mnemonic::parse(phrase.as_str()).map_err(|_| {
                    Error::KeyDerivation("invalid mnemonic for Solana key".to_string())
                })?;
                let seed = Zeroizing::new(mnemonic.to_seed(""));
                let keypair = SolanaKeypair::from_seed(&seed[..])?;
                tracing::info!(pubkey = %keypair.pubkey(), "derived Solana signer");
                Ok::<_, Error>(keypair)
            })
            .await
    }
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("mnemonic", &"[REDACTED]")
            .field("evm", &self.evm.get())
            .field("solana", &self.solana.get())
            .finish()
    }
}
