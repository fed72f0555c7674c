//! Transport-independent request handling
//!
//! [`SigningGateway`] owns the authentication gate, the dispatcher and the
//! keys, and turns each call into a status code plus JSON body. The HTTP
//! adapter in [`crate::server`] only moves bytes in and out.

use crate::auth::{AuthHeaders, AuthenticationGate, InMemoryNonceStore, SignedRequest};
use crate::config::Config;
use crate::signer::{SignRequest, SigningDispatcher};
use crate::wallet::KeyProvider;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status code and JSON body for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
}

impl GatewayResponse {
    fn success(data: impl Serialize) -> Self {
        Self {
            status: 200,
            body: json!({ "code": 0, "data": data }),
        }
    }

    fn failure(err: &Error) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "code": -1, "data": err.public_message() }),
        }
    }
}

/// Signer addresses as shown on the status routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerStatus {
    pub evm_address: String,
    pub sol_address: String,
    pub ipv4_white_list: bool,
    pub version: String,
}

pub struct SigningGateway {
    gate: AuthenticationGate,
    dispatcher: SigningDispatcher,
    keys: Arc<KeyProvider>,
    ipv4_allowlist_configured: bool,
}

impl SigningGateway {
    pub fn new(
        gate: AuthenticationGate,
        dispatcher: SigningDispatcher,
        keys: Arc<KeyProvider>,
        ipv4_allowlist_configured: bool,
    ) -> Self {
        Self {
            gate,
            dispatcher,
            keys,
            ipv4_allowlist_configured,
        }
    }

    /// Wire everything from configuration. Keys are derived here, so an
    /// unusable seed phrase fails before the listener opens.
    pub async fn from_config(config: Config) -> Result<Self> {
        let keys = Arc::new(KeyProvider::new(config.mnemonic));
        keys.init().await?;

        let gate = AuthenticationGate::new(config.secret, Arc::new(InMemoryNonceStore::new()))?;
        let dispatcher = SigningDispatcher::new(Arc::clone(&keys), config.allowlist);
        Ok(Self::new(
            gate,
            dispatcher,
            keys,
            config.ipv4_allowlist_configured,
        ))
    }

    /// Authenticate, parse, check policy and sign.
    pub async fn sign(&self, request: SignedRequest<'_>, headers: &AuthHeaders) -> GatewayResponse {
        if let Err(err) = self.gate.authenticate(request, headers) {
            return GatewayResponse::failure(&err);
        }

        let sign_request = match SignRequest::from_body(request.body) {
            Ok(sign_request) => sign_request,
            Err(err) => {
                tracing::warn!(event = "sign_failed", status = err.status_code(), message = %err);
                return GatewayResponse::failure(&err);
            }
        };
        sign_request.log();

        let started = Instant::now();
        let sign_type = sign_request.sign_type().as_str();
        match self.dispatcher.sign(&sign_request).await {
            Ok(artifact) => {
                tracing::info!(
                    event = "sign_ok",
                    sign_type,
                    duration_ms = started.elapsed().as_millis() as u64,
                    signer = %artifact.from,
                    tx_hash = %artifact.tx_hash,
                );
                GatewayResponse::success(artifact)
            }
            Err(err) => {
                let status = err.status_code();
                if status >= 500 {
                    tracing::error!(
                        event = "sign_failed",
                        sign_type,
                        duration_ms = started.elapsed().as_millis() as u64,
                        status,
                        message = %err,
                    );
                } else {
                    tracing::warn!(
                        event = "sign_failed",
                        sign_type,
                        duration_ms = started.elapsed().as_millis() as u64,
                        status,
                        message = %err,
                    );
                }
                GatewayResponse::failure(&err)
            }
        }
    }

    /// Unauthenticated status with masked addresses.
    pub async fn status(&self) -> GatewayResponse {
        match self.signer_status().await {
            Ok(mut status) => {
                status.evm_address = mask_address(&status.evm_address, 6, 4);
                status.sol_address = mask_address(&status.sol_address, 4, 4);
                status_body(status)
            }
            Err(err) => status_error(&err),
        }
    }

    /// Full addresses, behind the same authentication as signing.
    pub async fn full_address(
        &self,
        request: SignedRequest<'_>,
        headers: &AuthHeaders,
    ) -> GatewayResponse {
        if let Err(err) = self.gate.authenticate(request, headers) {
            return GatewayResponse::failure(&err);
        }
        match self.signer_status().await {
            Ok(status) => status_body(status),
            Err(err) => status_error(&err),
        }
    }

    pub async fn signer_status(&self) -> Result<SignerStatus> {
        let evm_address = self.keys.evm().await?.address_string();
        // a phrase the Solana derivation rejects still reports the EVM side
        let sol_address = match self.keys.solana().await {
            Ok(keypair) => keypair.pubkey().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "Solana address unavailable");
                String::new()
            }
        };
        Ok(SignerStatus {
            evm_address,
            sol_address,
            ipv4_white_list: self.ipv4_allowlist_configured,
            version: VERSION.to_string(),
        })
    }
}

impl std::fmt::Debug for SigningGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningGateway")
            .field("gate", &self.gate)
            .field("keys", &self.keys)
            .field("ipv4_allowlist_configured", &self.ipv4_allowlist_configured)
            .finish()
    }
}

fn status_body(status: SignerStatus) -> GatewayResponse {
    GatewayResponse {
        status: 200,
        body: json!(status),
    }
}

fn status_error(err: &Error) -> GatewayResponse {
    tracing::error!(error = %err, "status lookup failed");
    GatewayResponse {
        status: 200,
        body: json!({ "error": err.public_message() }),
    }
}

/// Keep `head` leading and `tail` trailing characters: `0x1234...abcd`.
/// Values too short to hide anything are returned trimmed but unmasked.
pub fn mask_address(address: &str, head: usize, tail: usize) -> String {
    let address = address.trim();
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= head + tail + 3 {
        return address.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{start}...{end}")
}
