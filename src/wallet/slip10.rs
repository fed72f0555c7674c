//! SLIP-0010 ed25519 key derivation
//!
//! Only hardened children exist for ed25519, so every path segment must end
//! in `'` (or `h`).

use crate::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

type HmacSha512 = Hmac<Sha512>;

const MASTER_SECRET: &[u8] = b"ed25519 seed";
const HARDENED: u32 = 0x8000_0000;

/// Derive a 32-byte ed25519 secret from a BIP-39 seed.
pub fn derive_ed25519(seed: &[u8], path: &str) -> Result<Zeroizing<[u8; 32]>> {
    let indices = parse_path(path)?;

    let (mut key, mut chain_code) = split(hmac_sha512(MASTER_SECRET, &[seed])?);
    for index in indices {
        let child = hmac_sha512(
            &chain_code,
            &[&[0x00u8][..], &key[..], &(index | HARDENED).to_be_bytes()[..]],
        )?;
        key.zeroize();
        chain_code.zeroize();
        (key, chain_code) = split(child);
    }
    chain_code.zeroize();

    Ok(Zeroizing::new(key))
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| Error::KeyDerivation(format!("HMAC init failed: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn split(block: Zeroizing<[u8; 64]>) -> ([u8; 32], [u8; 32]) {
    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&block[..32]);
    chain_code.copy_from_slice(&block[32..]);
    (key, chain_code)
}

/// `m/44'/501'/0'/0'` -> `[44, 501, 0, 0]`
fn parse_path(path: &str) -> Result<Vec<u32>> {
    let rest = path
        .trim()
        .strip_prefix("m/")
        .ok_or_else(|| Error::KeyDerivation(format!("path must start with 'm/': {path}")))?;

    rest.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let number = segment
                .strip_suffix('\'')
                .or_else(|| segment.strip_suffix('h'))
                .ok_or_else(|| {
                    Error::KeyDerivation(format!(
                        "ed25519 derivation requires hardened segments: {segment}"
                    ))
                })?;
            number
                .parse::<u32>()
                .ok()
                .filter(|index| *index < HARDENED)
                .ok_or_else(|| Error::KeyDerivation(format!("invalid path index: {segment}")))
        })
        .collect()
}
