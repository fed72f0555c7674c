//! Solana transaction handling on the `solana-transaction` / `solana-message`
//! types
//!
//! Only what the signer needs: decode caller text, deserialize a legacy or
//! v0 transaction, find our signer slot and write the result back out. No
//! RPC, no account resolution.

use bincode::Options;
use solana_message::VersionedMessage;
use solana_transaction::Transaction;
use thiserror::Error;

pub use solana_pubkey::Pubkey;
pub use solana_signature::{Signature, SIGNATURE_BYTES};
pub use solana_transaction::versioned::VersionedTransaction;

/// Default cap on decoded transaction bytes.
pub const DEFAULT_MAX_TX_DATA_SIZE: usize = 1280;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("{0}")]
    Decode(#[from] bincode::Error),

    #[error("signature count {actual} does not match header ({expected})")]
    SignatureCount { expected: usize, actual: usize },

    #[error("header requires {required} signers but only {keys} account keys")]
    InvalidHeader { required: usize, keys: usize },
}

fn wire_options() -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Decode transaction text: base58 first, base64 if that fails.
pub fn decode_tx_data(text: &str) -> Option<Vec<u8>> {
    use base64::Engine as _;

    let text = text.trim();
    if let Ok(bytes) = bs58::decode(text).into_vec() {
        return Some(bytes);
    }
    base64::engine::general_purpose::STANDARD.decode(text).ok()
}

/// Deserialize wire bytes, versioned layout first and legacy as fallback.
///
/// Signature slots must match the header so a signer slot can always be
/// written in place.
pub fn parse_transaction(bytes: &[u8]) -> Result<VersionedTransaction, WireError> {
    let tx = match wire_options().deserialize::<VersionedTransaction>(bytes) {
        Ok(tx) => tx,
        Err(versioned) => wire_options()
            .deserialize::<Transaction>(bytes)
            .map(VersionedTransaction::from)
            .map_err(|_| versioned)?,
    };

    let required = usize::from(tx.message.header().num_required_signatures);
    let keys = tx.message.static_account_keys().len();
    if required > keys {
        return Err(WireError::InvalidHeader { required, keys });
    }
    if tx.signatures.len() != required {
        return Err(WireError::SignatureCount {
            expected: required,
            actual: tx.signatures.len(),
        });
    }
    Ok(tx)
}

pub fn serialize_transaction(tx: &VersionedTransaction) -> Result<Vec<u8>, WireError> {
    Ok(wire_options().serialize(tx)?)
}

/// An unsigned transaction with one empty slot per required signer.
pub fn unsigned(message: VersionedMessage) -> VersionedTransaction {
    let required = usize::from(message.header().num_required_signatures);
    VersionedTransaction {
        signatures: vec![Signature::default(); required],
        message,
    }
}

/// Position of `signer` among the message's required signers.
pub fn signer_slot(tx: &VersionedTransaction, signer: &Pubkey) -> Option<usize> {
    let required = usize::from(tx.message.header().num_required_signatures);
    tx.message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| key == signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use solana_hash::Hash;
    use solana_message::compiled_instruction::CompiledInstruction;
    use solana_message::v0::{self, MessageAddressTableLookup};
    use solana_message::{Message, MessageHeader};

    fn header(signers: u8) -> MessageHeader {
        MessageHeader {
            num_required_signatures: signers,
            num_readonly_signed_accounts: 0,
            num_readonly_unsigned_accounts: 1,
        }
    }

    fn keys() -> Vec<Pubkey> {
        vec![
            Pubkey::new_from_array([5u8; 32]),
            Pubkey::new_from_array([6u8; 32]),
            Pubkey::default(),
        ]
    }

    fn transfer() -> CompiledInstruction {
        CompiledInstruction {
            program_id_index: 2,
            accounts: vec![0, 1],
            data: vec![2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    fn legacy(signers: u8) -> VersionedMessage {
        VersionedMessage::Legacy(Message {
            header: header(signers),
            account_keys: keys(),
            recent_blockhash: Hash::new_from_array([1u8; 32]),
            instructions: vec![transfer()],
        })
    }

    fn v0_with_lookup() -> VersionedMessage {
        VersionedMessage::V0(v0::Message {
            header: header(1),
            account_keys: keys(),
            recent_blockhash: Hash::new_from_array([1u8; 32]),
            instructions: vec![transfer()],
            address_table_lookups: vec![MessageAddressTableLookup {
                account_key: Pubkey::new_from_array([8u8; 32]),
                writable_indexes: vec![],
                readonly_indexes: vec![0],
            }],
        })
    }

    #[test]
    fn legacy_and_v0_parse_back() {
        for message in [legacy(1), v0_with_lookup()] {
            let tx = unsigned(message.clone());
            let bytes = serialize_transaction(&tx).unwrap();
            let parsed = parse_transaction(&bytes).unwrap();
            assert_eq!(parsed.message, message);
            assert_eq!(parsed.signatures, vec![Signature::default()]);
        }
    }

    #[test]
    fn legacy_wire_layout_starts_with_signatures() {
        let bytes = serialize_transaction(&unsigned(legacy(1))).unwrap();
        // compact-u16 signature count, one empty signature, then the header
        assert_eq!(bytes[0], 1);
        assert!(bytes[1..65].iter().all(|b| *b == 0));
        assert_eq!(&bytes[65..68], &[1, 0, 1]);

        let v0 = serialize_transaction(&unsigned(v0_with_lookup())).unwrap();
        assert_eq!(v0[65], 0x80);
    }

    #[test]
    fn mismatched_signature_slots_are_rejected() {
        let mut tx = unsigned(legacy(1));
        tx.signatures.push(Signature::default());
        let bytes = serialize_transaction(&tx).unwrap();
        assert!(matches!(
            parse_transaction(&bytes),
            Err(WireError::SignatureCount {
                expected: 1,
                actual: 2
            })
        ));

        let tx = unsigned(legacy(4));
        let bytes = serialize_transaction(&tx).unwrap();
        assert!(matches!(
            parse_transaction(&bytes),
            Err(WireError::InvalidHeader {
                required: 4,
                keys: 3
            })
        ));
    }

    #[test]
    fn truncated_and_padded_input_is_rejected() {
        let bytes = serialize_transaction(&unsigned(legacy(1))).unwrap();
        assert!(parse_transaction(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(parse_transaction(&padded).is_err());

        assert!(parse_transaction(&[0xffu8; 200]).is_err());
        assert!(parse_transaction(&[]).is_err());
    }

    #[test]
    fn signer_slot_only_covers_required_signers() {
        let tx = unsigned(legacy(1));
        assert_eq!(signer_slot(&tx, &Pubkey::new_from_array([5u8; 32])), Some(0));
        assert_eq!(signer_slot(&tx, &Pubkey::new_from_array([6u8; 32])), None);
    }

    #[test]
    fn tx_data_prefers_base58_then_base64() {
        let raw = vec![0xffu8; 80];
        let b58 = bs58::encode(&raw).into_string();
        assert_eq!(decode_tx_data(&b58), Some(raw.clone()));

        // '/' is outside the base58 alphabet, so this falls through to base64
        let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        assert_eq!(decode_tx_data(&b64), Some(raw));

        assert_eq!(decode_tx_data("***"), None);
    }

    #[test]
    fn system_program_id_is_all_zero() {
        let id: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(id.to_bytes(), [0u8; 32]);
        assert!("1111".parse::<Pubkey>().is_err());
    }
}
