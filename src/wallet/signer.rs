//! EVM signing wallet
//!
//! SECURITY: the secp256k1 key lives only inside alloy's `PrivateKeySigner`.
//! - It is never serialized
//! - It is never logged (`Debug` is redacted)
//! - It is only reachable through [`SecureWallet::sign_transaction`]

use crate::evm::EvmTxParams;
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, Signed, TxEnvelope, TypedTransaction};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{keccak256, Address, Bytes, Signature, B256};
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};

/// `m/44'/60'/0'/0/0`
pub const EVM_ACCOUNT_INDEX: u32 = 0;

/// A signed EVM transaction, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvmTransaction {
    /// EIP-2718 envelope bytes (plain RLP for legacy transactions)
    pub raw: Bytes,
    /// keccak256 of `raw`
    pub hash: B256,
}

/// Wallet holding the process's single EVM key
pub struct SecureWallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl SecureWallet {
    /// Derive the first account of a BIP-39 phrase.
    ///
    /// Errors never echo the phrase.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .index(EVM_ACCOUNT_INDEX)
            .and_then(|builder| builder.build())
            .map_err(|_| Error::KeyDerivation("invalid mnemonic for EVM key".to_string()))?;
        let address = signer.address();
        Ok(Self { signer, address })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed address
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Sign an approved transaction.
    pub fn sign_transaction(&self, params: &EvmTxParams) -> Result<SignedEvmTransaction> {
        let envelope = match params.to_typed_transaction() {
            TypedTransaction::Legacy(tx) => self.sign_into_envelope(tx)?,
            TypedTransaction::Eip2930(tx) => self.sign_into_envelope(tx)?,
            TypedTransaction::Eip1559(tx) => self.sign_into_envelope(tx)?,
            other => {
                return Err(Error::Signing(format!(
                    "unsupported transaction type {}",
                    other.tx_type() as u8
                )))
            }
        };

        let raw = envelope.encoded_2718();
        let hash = keccak256(&raw);
        Ok(SignedEvmTransaction {
            raw: Bytes::from(raw),
            hash,
        })
    }

    fn sign_into_envelope<T>(&self, mut tx: T) -> Result<TxEnvelope>
    where
        T: SignableTransaction<Signature>,
        TxEnvelope: From<Signed<T>>,
    {
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(tx.into_signed(signature).into())
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::FeeModel;
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::{address, U256};

    // Well-known development phrase (DO NOT use in production!)
    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    fn params(fee: FeeModel) -> EvmTxParams {
        EvmTxParams {
            chain_id: 1,
            nonce: 7,
            to: address!("5e1f62dac767b0491e3ce72469c217365d5b48cc"),
            data: Bytes::from(vec![0x0d, 0x5f, 0x0e, 0x3b]),
            value: U256::ZERO,
            gas_limit: 250_000,
            fee,
        }
    }

    #[test]
    fn test_wallet_from_mnemonic() {
        let wallet = SecureWallet::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(
            wallet.address_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_invalid_mnemonic_is_not_echoed() {
        let err = SecureWallet::from_mnemonic("not a real phrase").unwrap_err();
        assert!(!err.to_string().contains("real phrase"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = SecureWallet::from_mnemonic(TEST_MNEMONIC).unwrap();
        let debug_str = format!("{:?}", wallet);

        // first bytes of the account-0 private key
        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_signed_envelopes_recover_to_wallet() {
        let wallet = SecureWallet::from_mnemonic(TEST_MNEMONIC).unwrap();
        let fees = [
            (FeeModel::Legacy { gas_price: 1_000_000_000 }, None),
            (FeeModel::AccessList { gas_price: 1_000_000_000 }, Some(0x01u8)),
            (
                FeeModel::FeeMarket {
                    max_fee_per_gas: 30_000_000_000,
                    max_priority_fee_per_gas: 1_000_000_000,
                },
                Some(0x02u8),
            ),
        ];

        for (fee, type_byte) in fees {
            let signed = wallet.sign_transaction(&params(fee)).unwrap();
            match type_byte {
                Some(byte) => assert_eq!(signed.raw[0], byte),
                // legacy transactions are a bare RLP list
                None => assert!(signed.raw[0] >= 0xc0),
            }
            assert_eq!(signed.hash, keccak256(&signed.raw));

            let envelope = TxEnvelope::decode_2718(&mut signed.raw.as_ref()).unwrap();
            assert_eq!(*envelope.tx_hash(), signed.hash);
            assert_eq!(envelope.recover_signer().unwrap(), wallet.address());
        }
    }
}
