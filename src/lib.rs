//! Remote Signer
//!
//! A small HTTP service that holds one seed phrase and signs EVM and Solana
//! transactions for authenticated callers:
//! - Requests carry an HMAC-SHA256 signature over method, path, timestamp,
//!   nonce and body hash; each nonce is accepted once
//! - Every transaction passes a per-chain allowlist before it is signed
//! - Keys are derived lazily from the seed phrase and never leave the
//!   `wallet` module
//!
//! # Security Model
//!
//! - The seed phrase and shared secret live in `SecretString`s and are never
//!   logged; signing keys are zeroized on drop
//! - Policy denials are 400s with a precise reason, misconfiguration is a 500
//! - Authentication failures reveal nothing beyond "Unauthorized"

pub mod auth;
pub mod config;
pub mod evm;
pub mod gateway;
pub mod policy;
pub mod server;
pub mod signer;
pub mod solana;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{AllowlistConfig, Config};
pub use error::{Error, Result};
pub use gateway::{GatewayResponse, SigningGateway};
pub use signer::{SignRequest, SignedArtifact, SigningDispatcher};
