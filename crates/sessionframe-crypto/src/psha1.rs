//! P_SHA1 keyed pseudorandom stream.
//!
//! ```text
//! A(0) = label || nonce
//! A(i) = HMAC-SHA1(key, A(i-1))
//! P_SHA1 = HMAC-SHA1(key, A(1) || seed) || HMAC-SHA1(key, A(2) || seed) || ...
//! ```
//!
//! The stream is generated until it covers `position + length` bytes and the
//! window `[position, position + length)` is returned.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::{Zeroize, Zeroizing};

use crate::error::DerivationError;

type HmacSha1 = Hmac<Sha1>;

/// SHA-1 output size (one P_SHA1 block).
const BLOCK_SIZE: usize = 20;

/// Label used when a derived key request does not specify one.
pub const DEFAULT_LABEL: &[u8] = b"WS-SecureConversationWS-SecureConversation";

/// Label used to combine requestor and issuer entropy into a session key.
pub const COMBINED_KEY_LABEL: &[u8] = b"";

/// Largest keystream offset a caller may request (64 KiB).
///
/// Bounds the work an attacker-chosen offset or generation can cause.
pub const MAX_DERIVATION_OFFSET: usize = 64 * 1024;

/// Derive `length_bits / 8` bytes at `position` from the P_SHA1 stream keyed
/// by `source_key` and seeded with `label || nonce`.
///
/// # Errors
///
/// - `InvalidLength` if `length_bits` is zero or not a multiple of 8
/// - `KeyTooLong` if the requested length exceeds `source_key.len()`
/// - `OffsetTooLarge` if `position` exceeds [`MAX_DERIVATION_OFFSET`]
pub fn derive(
    source_key: &[u8],
    label: &[u8],
    nonce: &[u8],
    length_bits: u32,
    position: usize,
) -> Result<Zeroizing<Vec<u8>>, DerivationError> {
    if length_bits == 0 || length_bits % 8 != 0 {
        return Err(DerivationError::InvalidLength { length_bits });
    }

    let length = (length_bits / 8) as usize;
    if length > source_key.len() {
        return Err(DerivationError::KeyTooLong { requested: length, available: source_key.len() });
    }

    if position > MAX_DERIVATION_OFFSET {
        return Err(DerivationError::OffsetTooLarge {
            offset: Some(position),
            max: MAX_DERIVATION_OFFSET,
        });
    }

    let mut seed = Zeroizing::new(Vec::with_capacity(label.len() + nonce.len()));
    seed.extend_from_slice(label);
    seed.extend_from_slice(nonce);

    let total = position + length;
    let blocks = total.div_ceil(BLOCK_SIZE);
    let mut stream = Zeroizing::new(Vec::with_capacity(blocks * BLOCK_SIZE));

    let mut a = hmac_sha1(source_key, &[seed.as_slice()]);
    while stream.len() < total {
        let mut block = hmac_sha1(source_key, &[&a[..], seed.as_slice()]);
        stream.extend_from_slice(&block);
        block.zeroize();

        let next = hmac_sha1(source_key, &[&a[..]]);
        a.zeroize();
        a = next;
    }
    a.zeroize();

    debug_assert!(stream.len() >= total);
    Ok(Zeroizing::new(stream[position..total].to_vec()))
}

/// Combine requestor and issuer entropy into a session key.
///
/// The requestor entropy keys the stream and the issuer entropy is the
/// nonce, so both parties compute the same key from the exchanged values.
///
/// # Errors
///
/// Same as [`derive`]; in particular `KeyTooLong` if `key_size_bits` exceeds
/// the requestor entropy length.
pub fn compute_combined_key(
    requestor_entropy: &[u8],
    issuer_entropy: &[u8],
    key_size_bits: u32,
) -> Result<Zeroizing<Vec<u8>>, DerivationError> {
    derive(requestor_entropy, COMBINED_KEY_LABEL, issuer_entropy, key_size_bits, 0)
}

fn hmac_sha1(key: &[u8], parts: &[&[u8]]) -> [u8; BLOCK_SIZE] {
    let Ok(mut mac) = <HmacSha1 as Mac>::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    for part in parts {
        mac.update(part);
    }

    let mut out = [0u8; BLOCK_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; 16] = [0x07; 16];

    #[test]
    fn derive_is_deterministic() {
        let a = derive(&KEY, DEFAULT_LABEL, &NONCE, 256, 0).unwrap();
        let b = derive(&KEY, DEFAULT_LABEL, &NONCE, 256, 0).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn first_block_matches_hmac_definition() {
        let mut seed = DEFAULT_LABEL.to_vec();
        seed.extend_from_slice(&NONCE);

        let mut mac = <HmacSha1 as Mac>::new_from_slice(&KEY).unwrap();
        mac.update(&seed);
        let a1 = mac.finalize().into_bytes();

        let mut mac = <HmacSha1 as Mac>::new_from_slice(&KEY).unwrap();
        mac.update(&a1);
        mac.update(&seed);
        let block1 = mac.finalize().into_bytes();

        let derived = derive(&KEY, DEFAULT_LABEL, &NONCE, 128, 0).unwrap();
        assert_eq!(&derived[..], &block1[..16]);
    }

    #[test]
    fn position_selects_window_of_stream() {
        let full = derive(&KEY, DEFAULT_LABEL, &NONCE, 256, 0).unwrap();
        let tail = derive(&KEY, DEFAULT_LABEL, &NONCE, 128, 16).unwrap();
        assert_eq!(&full[16..32], &tail[..]);
    }

    #[test]
    fn window_crossing_block_boundary() {
        let full = derive(&KEY, DEFAULT_LABEL, &NONCE, 256, 0).unwrap();
        let mid = derive(&KEY, DEFAULT_LABEL, &NONCE, 64, 18).unwrap();
        assert_eq!(&full[18..26], &mid[..]);
    }

    #[test]
    fn key_too_long_rejected() {
        let short_key = [0u8; 16];
        let result = derive(&short_key, DEFAULT_LABEL, &NONCE, 192, 0);
        assert_eq!(result.unwrap_err(), DerivationError::KeyTooLong { requested: 24, available: 16 });
    }

    #[test]
    fn supported_lengths_succeed() {
        for bytes in [16u32, 24, 32] {
            let key = derive(&KEY, DEFAULT_LABEL, &NONCE, bytes * 8, 0).unwrap();
            assert_eq!(key.len(), bytes as usize);
        }
    }

    #[test]
    fn partial_byte_length_rejected() {
        assert_eq!(
            derive(&KEY, DEFAULT_LABEL, &NONCE, 100, 0).unwrap_err(),
            DerivationError::InvalidLength { length_bits: 100 }
        );
        assert_eq!(
            derive(&KEY, DEFAULT_LABEL, &NONCE, 0, 0).unwrap_err(),
            DerivationError::InvalidLength { length_bits: 0 }
        );
    }

    #[test]
    fn oversized_offset_rejected() {
        let result = derive(&KEY, DEFAULT_LABEL, &NONCE, 128, MAX_DERIVATION_OFFSET + 1);
        assert!(matches!(result, Err(DerivationError::OffsetTooLarge { .. })));
    }

    #[test]
    fn different_labels_produce_different_keys() {
        let a = derive(&KEY, b"label-a", &NONCE, 256, 0).unwrap();
        let b = derive(&KEY, b"label-b", &NONCE, 256, 0).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn combined_key_uses_both_contributions() {
        let requestor = [0x11u8; 32];
        let issuer_a = [0x22u8; 32];
        let issuer_b = [0x33u8; 32];

        let a = compute_combined_key(&requestor, &issuer_a, 256).unwrap();
        let b = compute_combined_key(&requestor, &issuer_b, 256).unwrap();
        assert_ne!(*a, *b);

        let expected = derive(&requestor, COMBINED_KEY_LABEL, &issuer_a, 256, 0).unwrap();
        assert_eq!(*a, *expected);
    }
}
