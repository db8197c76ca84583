//! Cookie sealing using `XChaCha20-Poly1305`
//!
//! All functions are pure - the nonce must be provided by the caller.
//!
//! Sealed layout: `nonce (24 bytes) || ciphertext || tag (16 bytes)`.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroizing;

use crate::error::SealError;

/// Size of the cookie encryption key (32 bytes).
pub const COOKIE_KEY_SIZE: usize = 32;

/// Size of the `XChaCha20` nonce prepended to every sealed cookie (24 bytes).
pub const COOKIE_NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Associated data binding sealed blobs to their purpose.
const COOKIE_AAD: &[u8] = b"sessionframe-cookie-v1";

/// Seal a cookie plaintext.
///
/// # Security
///
/// - Caller MUST provide a fresh random nonce for every cookie
/// - Authenticated encryption makes any modification detectable
pub fn seal_cookie(
    key: &[u8; COOKIE_KEY_SIZE],
    nonce: [u8; COOKIE_NONCE_SIZE],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let Ok(ciphertext) =
        cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad: COOKIE_AAD })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(COOKIE_NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Open a sealed cookie.
///
/// # Errors
///
/// - `Truncated` if the blob cannot hold a nonce and tag
/// - `AuthenticationFailed` if the key is wrong or the blob was modified
pub fn open_cookie(
    key: &[u8; COOKIE_KEY_SIZE],
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, SealError> {
    if sealed.len() < COOKIE_NONCE_SIZE + POLY1305_TAG_SIZE {
        return Err(SealError::Truncated { len: sealed.len() });
    }

    let (nonce, ciphertext) = sealed.split_at(COOKIE_NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: COOKIE_AAD })
        .map(Zeroizing::new)
        .map_err(|_| SealError::AuthenticationFailed)
}
