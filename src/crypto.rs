//! Access-token sealing.
//!
//! Integration tokens are stored as `0x01 || nonce(12) || ciphertext+tag`, sealed with
//! AES-256-GCM. The owning GitHub user id is bound in as associated data, so a row
//! copied onto another user fails to open.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const FORMAT_V1: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("sealing failed")]
    Seal,
    #[error("sealed token is malformed")]
    Malformed,
    #[error("sealed token could not be opened")]
    Open,
    #[error("opened token is not UTF-8")]
    NotUtf8,
}

/// 256-bit key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey(..)")
    }
}

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

fn token_aad(user_id: i64) -> Vec<u8> {
    format!("github|{}", user_id).into_bytes()
}

/// Seal `token` for storage on the integration row of `user_id`.
pub fn seal_access_token(
    key: &CryptoKey,
    user_id: i64,
    token: &str,
) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let aad = token_aad(user_id);
    let sealed = key
        .cipher()
        .encrypt(
            &nonce,
            Payload {
                msg: token.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Seal)?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.push(FORMAT_V1);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a token sealed by [`seal_access_token`] for the same `user_id`.
pub fn open_access_token(
    key: &CryptoKey,
    user_id: i64,
    stored: &[u8],
) -> Result<String, CryptoError> {
    if stored.len() < HEADER_LEN + TAG_LEN || stored[0] != FORMAT_V1 {
        return Err(CryptoError::Malformed);
    }

    let (nonce, sealed) = stored[1..].split_at(NONCE_LEN);
    let aad = token_aad(user_id);
    let plain = key
        .cipher()
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Open)?;

    String::from_utf8(plain).map_err(|_| CryptoError::NotUtf8)
}
