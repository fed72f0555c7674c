//! Request authentication for the signing routes
//!
//! Every request carries three headers:
//! - `X-Remote-Signer-Timestamp`: unix seconds
//! - `X-Remote-Signer-Nonce`: 16-128 chars of `[A-Za-z0-9_-]`
//! - `X-Remote-Signer-Signature`: hex HMAC-SHA256, optionally prefixed `v1=`
//!
//! The signature covers the canonical string
//!
//! ```text
//! v1\n{timestamp}\n{nonce}\n{METHOD}\n{path+query}\n{sha256(body) hex}
//! ```
//!
//! Field order, the uppercase method and the newline separators are part of
//! the wire protocol. Changing any of them requires a new version tag.

pub mod nonce_store;

use crate::{Error, Result};
use alloy::primitives::hex;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

pub use nonce_store::{InMemoryNonceStore, NonceStore, NONCE_MAX_ENTRIES};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_TIMESTAMP: &str = "x-remote-signer-timestamp";
pub const HEADER_NONCE: &str = "x-remote-signer-nonce";
pub const HEADER_SIGNATURE: &str = "x-remote-signer-signature";

/// Version tag of the canonical string
pub const CANONICAL_VERSION: &str = "v1";
/// Maximum accepted distance between caller and server clocks
pub const MAX_SKEW_SECONDS: u64 = 60;
/// How long an accepted nonce stays in the replay cache
pub const NONCE_TTL: Duration = Duration::from_secs(120);

const NONCE_MIN_LEN: usize = 16;
const NONCE_MAX_LEN: usize = 128;

/// Authentication material exactly as the caller sent it.
#[derive(Debug, Clone, Default)]
pub struct AuthHeaders {
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub signature: Option<String>,
}

/// The parts of a request the signature is computed over.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    /// Path including the query string, as received.
    pub path_and_query: &'a str,
    /// Undecoded body bytes.
    pub body: &'a [u8],
}

/// Attached to an authenticated request for log correlation. Carries no
/// secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub timestamp: u64,
    pub nonce: String,
    pub body_sha256: String,
}

/// Verifies request signatures and enforces single use of each nonce.
pub struct AuthenticationGate {
    secret: SecretString,
    nonces: Arc<dyn NonceStore>,
}

impl AuthenticationGate {
    pub fn new(secret: SecretString, nonces: Arc<dyn NonceStore>) -> Result<Self> {
        if secret.expose_secret().is_empty() {
            return Err(Error::misconfigured(
                "Server misconfigured: REMOTE_SIGNER_SECRET missing",
            ));
        }
        Ok(Self { secret, nonces })
    }

    pub fn nonce_store(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Authenticate against the current wall clock.
    pub fn authenticate(
        &self,
        request: SignedRequest<'_>,
        headers: &AuthHeaders,
    ) -> Result<AuthContext> {
        self.authenticate_at(request, headers, unix_now())
    }

    /// Authenticate with an explicit `now` (unix seconds).
    pub fn authenticate_at(
        &self,
        request: SignedRequest<'_>,
        headers: &AuthHeaders,
        now: u64,
    ) -> Result<AuthContext> {
        let timestamp = headers
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| deny(request, "bad_timestamp"))?;

        if now.abs_diff(timestamp) > MAX_SKEW_SECONDS {
            tracing::warn!(
                event = "remote_signer_auth_denied",
                reason = "timestamp_skew",
                ts = timestamp,
                now,
                method = request.method,
                path = request.path_and_query,
            );
            return Err(Error::Unauthorized("timestamp_skew"));
        }

        let nonce = headers
            .nonce
            .as_deref()
            .filter(|n| is_valid_nonce(n))
            .ok_or_else(|| deny(request, "bad_nonce"))?;

        let signature = headers
            .signature
            .as_deref()
            .map(strip_signature_version)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| deny(request, "missing_signature"))?;

        let body_sha256 = sha256_hex(request.body);
        let canonical = canonical_string(timestamp, nonce, request, &body_sha256);
        let expected = hmac_sha256_hex(self.secret.expose_secret().as_bytes(), &canonical)?;

        if !hex_signatures_match(signature, &expected) {
            tracing::warn!(
                event = "remote_signer_auth_denied",
                reason = "bad_signature",
                ts = timestamp,
                nonce,
                body_sha256 = %body_sha256,
                sig_len = signature.len(),
                sig_prefix = %prefix(signature, 12),
                method = request.method,
                path = request.path_and_query,
            );
            return Err(Error::Unauthorized("bad_signature"));
        }

        // Only record the nonce once the signature checks out, otherwise an
        // unauthenticated caller could burn nonces a legitimate caller will use.
        if !self.nonces.insert_if_absent(nonce, NONCE_TTL, now) {
            tracing::warn!(
                event = "remote_signer_auth_denied",
                reason = "replay",
                ts = timestamp,
                nonce,
                body_sha256 = %body_sha256,
                method = request.method,
                path = request.path_and_query,
            );
            return Err(Error::ReplayDetected);
        }

        tracing::info!(
            event = "remote_signer_auth_ok",
            ts = timestamp,
            nonce,
            body_sha256 = %body_sha256,
            method = request.method,
            path = request.path_and_query,
        );

        Ok(AuthContext {
            timestamp,
            nonce: nonce.to_string(),
            body_sha256,
        })
    }
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("secret", &"[REDACTED]")
            .field("nonces", &self.nonces.len())
            .finish()
    }
}

fn deny(request: SignedRequest<'_>, reason: &'static str) -> Error {
    tracing::warn!(
        event = "remote_signer_auth_denied",
        reason,
        method = request.method,
        path = request.path_and_query,
    );
    Error::Unauthorized(reason)
}

/// Build the canonical string for a request.
pub fn canonical_string(
    timestamp: u64,
    nonce: &str,
    request: SignedRequest<'_>,
    body_sha256: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        CANONICAL_VERSION,
        timestamp,
        nonce,
        request.method.to_ascii_uppercase(),
        request.path_and_query,
        body_sha256
    )
}

/// Compute the three authentication headers for a request.
///
/// Used by callers and by the `sign-headers` CLI command; the gateway itself
/// only verifies.
pub fn sign_request_headers(
    secret: &SecretString,
    request: SignedRequest<'_>,
    timestamp: u64,
    nonce: &str,
) -> Result<AuthHeaders> {
    let body_sha256 = sha256_hex(request.body);
    let canonical = canonical_string(timestamp, nonce, request, &body_sha256);
    let signature = hmac_sha256_hex(secret.expose_secret().as_bytes(), &canonical)?;

    Ok(AuthHeaders {
        timestamp: Some(timestamp.to_string()),
        nonce: Some(nonce.to_string()),
        signature: Some(format!("{}={}", CANONICAL_VERSION, signature)),
    })
}

/// Generate a fresh nonce that satisfies the nonce pattern.
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac_sha256_hex(secret: &[u8], message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| Error::misconfigured(format!("HMAC init failed: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Positive integer seconds, nothing else.
fn parse_timestamp(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().filter(|ts| *ts > 0)
}

pub fn is_valid_nonce(nonce: &str) -> bool {
    (NONCE_MIN_LEN..=NONCE_MAX_LEN).contains(&nonce.len())
        && nonce
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Accept `"v1=<hex>"` or bare `"<hex>"`.
fn strip_signature_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.find('=') {
        Some(idx) => trimmed[idx + 1..].trim(),
        None => trimmed,
    }
}

/// Decode both sides as hex and compare in constant time. A length mismatch
/// fails before any byte is compared.
fn hex_signatures_match(supplied: &str, expected: &str) -> bool {
    let (Ok(a), Ok(b)) = (hex::decode(supplied), hex::decode(expected)) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(&b).into()
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
