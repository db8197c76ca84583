//! Confidentiality and integrity for cookie plaintext.

use sessionframe_crypto::{COOKIE_KEY_SIZE, COOKIE_NONCE_SIZE, Zeroizing, open_cookie, seal_cookie};

use super::error::{CookieError, InvalidCookieReason};
use crate::env::Environment;

/// Turns canonical cookie bytes into an opaque blob and back.
pub trait CookieProtector: Send + Sync {
    /// Protect canonical cookie bytes.
    ///
    /// # Errors
    ///
    /// - `Encode` if the primitive fails
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CookieError>;

    /// Recover canonical cookie bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidCookie(Tampered)` if the blob fails authentication
    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CookieError>;
}

/// XChaCha20-Poly1305 protector with an externally supplied key.
///
/// A fresh 24-byte nonce is drawn from the environment for every cookie.
pub struct XChaChaCookieProtector<E: Environment> {
    key: Zeroizing<[u8; COOKIE_KEY_SIZE]>,
    env: E,
}

impl<E: Environment> XChaChaCookieProtector<E> {
    /// Create a protector. The key must be kept secret and shared by every
    /// node that decodes cookies.
    pub fn new(key: [u8; COOKIE_KEY_SIZE], env: E) -> Self {
        Self { key: Zeroizing::new(key), env }
    }
}

impl<E: Environment> CookieProtector for XChaChaCookieProtector<E> {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CookieError> {
        let mut nonce = [0u8; COOKIE_NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        Ok(seal_cookie(&self.key, nonce, plaintext))
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CookieError> {
        open_cookie(&self.key, blob).map_err(|_| InvalidCookieReason::Tampered.into())
    }
}
