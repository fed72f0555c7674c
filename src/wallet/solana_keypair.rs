//! Solana signing keypair

use super::slip10;
use crate::solana::{signer_slot, Pubkey, Signature, VersionedTransaction, SIGNATURE_BYTES};
use crate::{Error, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

pub const SOLANA_DERIVATION_PATH: &str = "m/44'/501'/0'/0'";

/// Ed25519 keypair for the process's Solana account.
///
/// The secret half is zeroized on drop by `ed25519-dalek`.
pub struct SolanaKeypair {
    signing_key: SigningKey,
    pubkey: Pubkey,
}

impl SolanaKeypair {
    /// Derive the keypair at [`SOLANA_DERIVATION_PATH`] from a BIP-39 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let secret = slip10::derive_ed25519(seed, SOLANA_DERIVATION_PATH)?;
        let signing_key = SigningKey::from_bytes(&secret);
        let pubkey = Pubkey::new_from_array(signing_key.verifying_key().to_bytes());
        Ok(Self {
            signing_key,
            pubkey,
        })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        Signature::from(self.signing_key.sign(message).to_bytes())
    }

    /// Check a signature over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(bytes) = <[u8; SIGNATURE_BYTES]>::try_from(signature.as_ref()) else {
            return false;
        };
        VerifyingKey::from_bytes(&self.pubkey.to_bytes())
            .and_then(|key| key.verify(message, &ed25519_dalek::Signature::from_bytes(&bytes)))
            .is_ok()
    }

    /// Sign the transaction's message and store the signature in this key's
    /// slot. Fails if the key is not one of the message's required signers.
    pub fn sign_transaction(&self, tx: &mut VersionedTransaction) -> Result<Signature> {
        let pubkey = self.pubkey();
        let not_a_signer = || Error::Signing(format!("{pubkey} is not a required signer"));

        let slot = signer_slot(tx, &pubkey).ok_or_else(not_a_signer)?;
        let signature = self.sign_message(&tx.message.serialize());
        *tx.signatures.get_mut(slot).ok_or_else(not_a_signer)? = signature;
        Ok(signature)
    }
}

impl std::fmt::Debug for SolanaKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaKeypair")
            .field("pubkey", &self.pubkey())
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}
