//! Configuration for the remote signer
//!
//! Secrets come from the environment (optionally via `.env`); allowlists are
//! compiled in and may be replaced field-by-field from a JSON file.

pub mod evm_allowlist;
pub mod solana_allowlist;

pub use evm_allowlist::{ApprovePolicy, EvmAllowlistPolicy, APPROVE_SELECTOR};
pub use solana_allowlist::SolanaAllowlistPolicy;

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable names
pub mod env_vars {
    pub const REMOTE_SIGNER_SECRET: &str = "REMOTE_SIGNER_SECRET";
    pub const MNEMONIC: &str = "MNEMONIC";
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    /// Path to a JSON allowlist override file
    pub const REMOTE_SIGNER_ALLOWLIST: &str = "REMOTE_SIGNER_ALLOWLIST";
    /// Only its presence is reported; enforcement belongs to the network edge.
    pub const IPV4_WHITE_LIST: &str = "IPV4_WHITE_LIST";
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Both allowlists, as loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowlistConfig {
    pub evm: EvmAllowlistPolicy,
    pub solana: SolanaAllowlistPolicy,
}

impl AllowlistConfig {
    /// Load an override file. Sections or fields it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read allowlist {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("invalid allowlist {}: {}", path.display(), e))
        })
    }

    /// Non-empty checks run once before any request is served.
    pub fn validate(&self) -> Result<()> {
        self.evm.validate()?;
        self.solana.validate()
    }
}

/// Process configuration
#[derive(Debug)]
pub struct Config {
    pub secret: SecretString,
    pub mnemonic: SecretString,
    pub listen: SocketAddr,
    pub allowlist: AllowlistConfig,
    pub ipv4_allowlist_configured: bool,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// `allowlist_path` takes precedence over `REMOTE_SIGNER_ALLOWLIST`.
    pub fn from_env(allowlist_path: Option<&Path>) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), allowlist_path)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F, allowlist_path: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = required(&lookup, env_vars::REMOTE_SIGNER_SECRET)?;
        let mnemonic = crate::wallet::normalize_mnemonic(
            &required(&lookup, env_vars::MNEMONIC)?,
        );
        if mnemonic.is_empty() {
            return Err(Error::Config(format!("{} is empty", env_vars::MNEMONIC)));
        }

        let host = lookup(env_vars::HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup(env_vars::PORT) {
            Some(port) => port.trim().parse::<u16>().map_err(|_| {
                Error::Config(format!("{} is not a valid port: {}", env_vars::PORT, port))
            })?,
            None => DEFAULT_PORT,
        };
        let listen = format!("{}:{}", host.trim(), port)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))?;

        let allowlist = match allowlist_path {
            Some(path) => AllowlistConfig::load(path)?,
            None => match lookup(env_vars::REMOTE_SIGNER_ALLOWLIST) {
                Some(path) if !path.trim().is_empty() => {
                    AllowlistConfig::load(Path::new(path.trim()))?
                }
                _ => AllowlistConfig::default(),
            },
        };
        allowlist.validate()?;

        let ipv4_allowlist_configured = lookup(env_vars::IPV4_WHITE_LIST)
            .is_some_and(|v| !v.trim().is_empty());

        Ok(Self {
            secret: SecretString::from(secret),
            mnemonic: SecretString::from(mnemonic),
            listen,
            allowlist,
            ipv4_allowlist_configured,
        })
    }

    pub fn secret_len(&self) -> usize {
        self.secret.expose_secret().len()
    }
}

/// Value exactly as set; blank counts as unset.
fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{} is not set", name))),
    }
}
