//! Signing requests and their dispatch
//!
//! A request names one chain family. Each family has its own payload type,
//! its own policy engine and its own key, so adding a family means adding a
//! variant here and a match arm in [`SigningDispatcher::sign`].

use crate::config::AllowlistConfig;
use crate::evm::{lower_hex, EvmTxParams};
use crate::policy::{EvmPolicyEngine, SolanaPolicyEngine};
use crate::solana::serialize_transaction;
use crate::wallet::KeyProvider;
use crate::{Error, Result};
use alloy::primitives::hex;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Chain family requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignType {
    Evm,
    Solana,
}

impl SignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Evm => "evm",
            SignType::Solana => "solana",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvmSignPayload {
    /// Claimed signer, lowercased
    pub from: Option<String>,
    /// Unparsed transaction object
    pub tx: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolanaSignPayload {
    pub from: Option<String>,
    /// base58 or base64 transaction text; absence is reported at dispatch
    pub tx_data: Option<Value>,
}

/// A request to sign one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SignRequest {
    Evm(EvmSignPayload),
    Solana(SolanaSignPayload),
}

impl SignRequest {
    /// Parse the JSON body of a sign call.
    ///
    /// The payload may be named `payload`, `data` or `rawData`; the first
    /// non-null one wins.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let body: Value =
            serde_json::from_slice(body).map_err(|_| Error::BadRequest("bad body".to_string()))?;
        let body = body
            .as_object()
            .ok_or_else(|| Error::BadRequest("bad body".to_string()))?;

        let sign_type = match body.get("signType").and_then(Value::as_str) {
            Some("evm") => SignType::Evm,
            Some("solana") => SignType::Solana,
            _ => return Err(Error::BadRequest("bad signType param".to_string())),
        };

        let payload = ["payload", "data", "rawData"]
            .iter()
            .find_map(|key| body.get(*key).filter(|v| !v.is_null()))
            .and_then(Value::as_object)
            .ok_or_else(|| Error::BadRequest("bad rawData param".to_string()))?;

        Ok(match sign_type {
            SignType::Evm => SignRequest::Evm(EvmSignPayload {
                from: claimed_from(payload).map(|from| from.to_lowercase()),
                tx: match payload.get("tx") {
                    Some(tx) if tx.is_object() => tx.clone(),
                    _ => Value::Object(payload.clone()),
                },
            }),
            SignType::Solana => SignRequest::Solana(SolanaSignPayload {
                from: claimed_from(payload),
                tx_data: [
                    payload.get("txData"),
                    payload.get("tx").and_then(|tx| tx.get("data")),
                    payload.get("data"),
                ]
                .into_iter()
                .flatten()
                .find(|v| !v.is_null())
                .cloned(),
            }),
        })
    }

    pub fn sign_type(&self) -> SignType {
        match self {
            SignRequest::Evm(_) => SignType::Evm,
            SignRequest::Solana(_) => SignType::Solana,
        }
    }

    /// Emit the `sign_request` event. Fields are read from the raw payload
    /// so rejected requests are logged too; calldata is never logged.
    pub fn log(&self) {
        match self {
            SignRequest::Evm(payload) => {
                let tx = &payload.tx;
                let text = |name: &str| tx.get(name).map(display_value).unwrap_or_default();
                let data = tx.get("data").and_then(Value::as_str).unwrap_or("0x");
                tracing::info!(
                    event = "sign_request",
                    sign_type = "evm",
                    chain_id = %text("chainId"),
                    from_req = payload.from.as_deref().unwrap_or(""),
                    to = %text("to").to_lowercase(),
                    selector = %raw_selector(data),
                    nonce = %text("nonce"),
                    tx_type = %text("type"),
                    value = %text("value"),
                    gas_limit = %text("gasLimit"),
                    data_len = data.len(),
                );
            }
            SignRequest::Solana(payload) => {
                let len = payload
                    .tx_data
                    .as_ref()
                    .and_then(Value::as_str)
                    .map_or(0, str::len);
                tracing::info!(
                    event = "sign_request",
                    sign_type = "solana",
                    from_req = %truncate(payload.from.as_deref().unwrap_or(""), 64),
                    tx_data_len = len,
                );
            }
        }
    }
}

/// Result of a successful signing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedArtifact {
    /// `0x` hex (EVM) or base64 (Solana) signed transaction
    pub signed_tx: String,
    /// keccak256 hash (EVM) or base58 first signature (Solana)
    pub tx_hash: String,
    /// Signer address or public key
    pub from: String,
}

/// Routes approved requests to the matching policy engine and key.
#[derive(Debug)]
pub struct SigningDispatcher {
    keys: Arc<KeyProvider>,
    evm_policy: EvmPolicyEngine,
    solana_policy: SolanaPolicyEngine,
}

impl SigningDispatcher {
    pub fn new(keys: Arc<KeyProvider>, allowlist: AllowlistConfig) -> Self {
        Self {
            keys,
            evm_policy: EvmPolicyEngine::new(allowlist.evm),
            solana_policy: SolanaPolicyEngine::new(allowlist.solana),
        }
    }

    pub async fn sign(&self, request: &SignRequest) -> Result<SignedArtifact> {
        match request {
            SignRequest::Evm(payload) => self.sign_evm(payload).await,
            SignRequest::Solana(payload) => self.sign_solana(payload).await,
        }
    }

    async fn sign_evm(&self, payload: &EvmSignPayload) -> Result<SignedArtifact> {
        let wallet = self.keys.evm().await?;
        let signer = lower_hex(&wallet.address());
        if let Some(from) = payload.from.as_deref() {
            if from != signer {
                return Err(Error::BadRequest(format!(
                    "from mismatch: req={from}, signer={signer}"
                )));
            }
        }

        let params = EvmTxParams::from_json(&payload.tx)?;
        self.evm_policy.check(&params)?;

        let signed = wallet.sign_transaction(&params)?;
        Ok(SignedArtifact {
            signed_tx: hex::encode_prefixed(&signed.raw),
            tx_hash: hex::encode_prefixed(signed.hash),
            from: wallet.address_string(),
        })
    }

    async fn sign_solana(&self, payload: &SolanaSignPayload) -> Result<SignedArtifact> {
        let keypair = self.keys.solana().await?;
        let tx_data = payload
            .tx_data
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::BadRequest("Missing txData for Solana".to_string()))?;

        let bytes = self.solana_policy.screen(tx_data)?;

        let signer = keypair.pubkey().to_string();
        if let Some(from) = payload.from.as_deref() {
            if from != signer {
                return Err(Error::BadRequest(format!(
                    "from mismatch: req={from}, signer={signer}"
                )));
            }
        }

        let mut tx = self.solana_policy.inspect(&bytes)?;
        keypair.sign_transaction(&mut tx)?;

        let first = tx
            .signatures
            .first()
            .ok_or_else(|| Error::Signing("transaction has no signatures".to_string()))?;
        let raw = serialize_transaction(&tx)
            .map_err(|e| Error::Signing(format!("cannot serialize transaction: {e}")))?;
        Ok(SignedArtifact {
            signed_tx: base64::engine::general_purpose::STANDARD.encode(raw),
            tx_hash: first.to_string(),
            from: signer,
        })
    }
}

/// Non-empty `from` claim, trimmed. Non-string claims are rendered as text.
fn claimed_from(payload: &Map<String, Value>) -> Option<String> {
    let from = match payload.get("from")? {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!from.is_empty()).then_some(from)
}

/// Selector as the caller sent it: `0x` plus eight hex digits, `0x` when
/// too short, empty when not hex-prefixed.
fn raw_selector(data: &str) -> String {
    let data = data.to_lowercase();
    if !data.starts_with("0x") {
        return String::new();
    }
    match data.get(..10) {
        Some(selector) => selector.to_string(),
        None => "0x".to_string(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvmAllowlistPolicy;
    use crate::solana::{parse_transaction, unsigned, Pubkey, Signature};
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use secrecy::SecretString;
    use serde_json::json;
    use solana_hash::Hash;
    use solana_message::compiled_instruction::CompiledInstruction;
    use solana_message::{Message, MessageHeader, VersionedMessage};

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const SIGNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const ROUTER: &str = "0x5e1f62dac767b0491e3ce72469c217365d5b48cc";

    fn dispatcher_with(allowlist: AllowlistConfig) -> SigningDispatcher {
        let keys = Arc::new(KeyProvider::new(SecretString::from(TEST_MNEMONIC)));
        SigningDispatcher::new(keys, allowlist)
    }

    fn dispatcher() -> SigningDispatcher {
        dispatcher_with(AllowlistConfig::default())
    }

    fn evm_body(tx: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "signType": "evm", "payload": { "tx": tx } })).unwrap()
    }

    fn router_swap() -> Value {
        json!({
            "chainId": 1,
            "nonce": 3,
            "to": ROUTER,
            "data": "0x0d5f0e3b0000000000000000000000000000000000000000000000000000000000000001",
            "value": "0",
            "gasLimit": 300000,
            "maxFeePerGas": "30000000000",
            "maxPriorityFeePerGas": "1000000000"
        })
    }

    async fn solana_transfer(dispatcher: &SigningDispatcher, program: Pubkey) -> String {
        let payer = dispatcher.keys.solana().await.unwrap().pubkey();
        let tx = unsigned(VersionedMessage::Legacy(Message {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys: vec![payer, Pubkey::new_from_array([2u8; 32]), program],
            recent_blockhash: Hash::new_from_array([1u8; 32]),
            instructions: vec![CompiledInstruction {
                program_id_index: 2,
                accounts: vec![0, 1],
                data: vec![2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
            }],
        }));
        bs58::encode(serialize_transaction(&tx).unwrap()).into_string()
    }

    #[test]
    fn body_parsing_accepts_payload_aliases() {
        for key in ["payload", "data", "rawData"] {
            let body = json!({ "signType": "evm", key: { "from": "0xABC", "tx": { "chainId": 1 } } });
            let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
            match request {
                SignRequest::Evm(p) => {
                    assert_eq!(p.from.as_deref(), Some("0xabc"));
                    assert_eq!(p.tx, json!({ "chainId": 1 }));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        // bare tx object
        let body = json!({ "signType": "evm", "payload": { "chainId": 1 } });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(
            request,
            SignRequest::Evm(EvmSignPayload {
                from: None,
                tx: json!({ "chainId": 1 })
            })
        );
    }

    #[test]
    fn body_parsing_finds_solana_tx_data() {
        for payload in [
            json!({ "txData": "abc" }),
            json!({ "tx": { "data": "abc" } }),
            json!({ "data": "abc" }),
        ] {
            let body = json!({ "signType": "solana", "payload": payload });
            match SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap() {
                SignRequest::Solana(p) => assert_eq!(p.tx_data, Some(json!("abc"))),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn body_schema_errors() {
        let cases: [(&[u8], &str); 4] = [
            (b"not json", "bad body"),
            (br#"{"signType":"btc","payload":{}}"#, "bad signType param"),
            (br#"{"signType":"evm"}"#, "bad rawData param"),
            (br#"{"signType":"evm","payload":"0xdead"}"#, "bad rawData param"),
        ];
        for (body, expected) in cases {
            let err = SignRequest::from_body(body).unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.to_string(), expected);
        }
    }

    #[tokio::test]
    async fn evm_router_swap_is_signed() {
        let dispatcher = dispatcher();
        let request = SignRequest::from_body(&evm_body(router_swap())).unwrap();
        let artifact = dispatcher.sign(&request).await.unwrap();

        assert_eq!(artifact.from.to_lowercase(), SIGNER);
        assert!(artifact.signed_tx.starts_with("0x02"));
        assert_eq!(artifact.tx_hash.len(), 66);

        let raw = hex::decode(&artifact.signed_tx).unwrap();
        let envelope = TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap();
        assert_eq!(hex::encode_prefixed(envelope.tx_hash()), artifact.tx_hash);
        assert_eq!(lower_hex(&envelope.recover_signer().unwrap()), SIGNER);
    }

    #[tokio::test]
    async fn evm_unknown_chain_is_denied() {
        let mut tx = router_swap();
        tx["chainId"] = json!(999);
        let request = SignRequest::from_body(&evm_body(tx)).unwrap();
        let err = dispatcher().sign(&request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "chainId not allowed");
    }

    #[tokio::test]
    async fn evm_from_is_compared_case_insensitively() {
        let body = json!({
            "signType": "evm",
            "payload": { "from": "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266", "tx": router_swap() }
        });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        dispatcher().sign(&request).await.unwrap();

        let body = json!({ "signType": "evm", "payload": { "from": ROUTER, "tx": router_swap() } });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        let err = dispatcher().sign(&request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("from mismatch: req={ROUTER}, signer={SIGNER}")
        );
    }

    #[tokio::test]
    async fn evm_empty_data_follows_policy() {
        let mut tx = router_swap();
        tx["data"] = json!("0x");
        let request = SignRequest::from_body(&evm_body(tx)).unwrap();
        let err = dispatcher().sign(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "empty data not allowed");

        let permissive = dispatcher_with(AllowlistConfig {
            evm: EvmAllowlistPolicy {
                allow_empty_data: true,
                ..Default::default()
            },
            ..Default::default()
        });
        permissive.sign(&request).await.unwrap();
    }

    #[tokio::test]
    async fn solana_system_transfer_is_signed() {
        let dispatcher = dispatcher();
        let tx_data = solana_transfer(&dispatcher, Pubkey::default()).await;
        let signer = dispatcher.keys.solana().await.unwrap().pubkey().to_string();

        let body = json!({ "signType": "solana", "payload": { "from": signer, "txData": tx_data } });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        let artifact = dispatcher.sign(&request).await.unwrap();

        assert_eq!(artifact.from, signer);
        let signed = base64::engine::general_purpose::STANDARD
            .decode(&artifact.signed_tx)
            .unwrap();
        let tx = parse_transaction(&signed).unwrap();
        assert_ne!(tx.signatures[0], Signature::default());
        assert_eq!(tx.signatures[0].to_string(), artifact.tx_hash);
        assert!(dispatcher
            .keys
            .solana()
            .await
            .unwrap()
            .verify(&tx.message.serialize(), &tx.signatures[0]));
    }

    #[tokio::test]
    async fn solana_forbidden_program_is_denied() {
        let dispatcher = dispatcher();
        let token: Pubkey = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".parse().unwrap();
        let tx_data = solana_transfer(&dispatcher, token).await;

        let body = json!({ "signType": "solana", "payload": { "txData": tx_data } });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        let err = dispatcher.sign(&request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().starts_with("Forbidden program: Tokenkeg"));
    }

    #[tokio::test]
    async fn solana_missing_tx_data_and_wrong_signer() {
        let dispatcher = dispatcher();
        let body = json!({ "signType": "solana", "payload": { "txData": 5 } });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(
            dispatcher.sign(&request).await.unwrap_err().to_string(),
            "Missing txData for Solana"
        );

        let tx_data = solana_transfer(&dispatcher, Pubkey::default()).await;
        let body = json!({
            "signType": "solana",
            "payload": { "from": "11111111111111111111111111111111", "txData": tx_data }
        });
        let request = SignRequest::from_body(&serde_json::to_vec(&body).unwrap()).unwrap();
        let err = dispatcher.sign(&request).await.unwrap_err();
        assert!(err.to_string().starts_with("from mismatch: req=11111111111111111111111111111111"));
    }

    #[test]
    fn raw_selector_matches_logged_form() {
        assert_eq!(raw_selector("0x095EA7B3aaaa"), "0x095ea7b3");
        assert_eq!(raw_selector("0x12"), "0x");
        assert_eq!(raw_selector("095ea7b3"), "");
    }
}
