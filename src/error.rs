//! Error types for the remote signer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Request authentication failed. The reason is for logs only; callers
    /// always see a bare "Unauthorized".
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Replay detected")]
    ReplayDetected,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PolicyDenied(String),

    #[error("{0}")]
    Misconfiguration(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn denied(reason: impl Into<String>) -> Self {
        Error::PolicyDenied(reason.into())
    }

    pub fn misconfigured(reason: impl Into<String>) -> Self {
        Error::Misconfiguration(reason.into())
    }

    /// HTTP status this error maps to at the transport edge.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::ReplayDetected => 409,
            Error::BadRequest(_) | Error::PolicyDenied(_) => 400,
            Error::Misconfiguration(_)
            | Error::Signing(_)
            | Error::Config(_)
            | Error::KeyDerivation(_)
            | Error::Json(_)
            | Error::Io(_) => 500,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Error::Unauthorized(_) => "Unauthorized".to_string(),
            Error::KeyDerivation(_) | Error::Json(_) | Error::Io(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
