//! Derived key requests.
//!
//! A derived key is identified by (label, nonce, position, length). The
//! position is either an absolute keystream offset or a generation, whose
//! effective offset is `generation * length`. Exactly one of the two must be
//! supplied; [`DerivedKeyParamsBuilder::build`] rejects anything else before
//! any derivation happens.

use zeroize::Zeroizing;

use crate::{
    error::DerivationError,
    psha1::{DEFAULT_LABEL, MAX_DERIVATION_OFFSET, derive},
};

/// Nonce size used when the deriving party generates a fresh nonce.
pub const DEFAULT_NONCE_SIZE: usize = 16;

/// Derived key length used when the caller does not request one (32 bytes).
pub const DEFAULT_DERIVED_KEY_LENGTH: usize = 32;

/// Position of a derived key within the P_SHA1 keystream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPosition {
    /// Absolute byte offset into the keystream
    Offset(usize),
    /// Generation number; effective offset is `generation * length`
    Generation(u32),
}

/// Validated parameters for one derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyParams {
    label: Vec<u8>,
    nonce: Vec<u8>,
    position: KeyPosition,
    length: usize,
}

impl DerivedKeyParams {
    /// Start building parameters for a key of `length` bytes.
    pub fn builder(length: usize) -> DerivedKeyParamsBuilder {
        DerivedKeyParamsBuilder {
            label: None,
            nonce: None,
            offset: None,
            generation: None,
            length,
        }
    }

    /// Derivation label.
    pub fn label(&self) -> &[u8] {
        &self.label
    }

    /// Nonce supplied by the deriving party.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Offset or generation.
    pub fn position(&self) -> KeyPosition {
        self.position
    }

    /// Key length in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Absolute keystream offset for this key.
    pub fn effective_offset(&self) -> usize {
        match self.position {
            KeyPosition::Offset(offset) => offset,
            // Checked in build()
            KeyPosition::Generation(generation) => generation as usize * self.length,
        }
    }
}

/// Builder for [`DerivedKeyParams`].
#[derive(Debug, Clone)]
pub struct DerivedKeyParamsBuilder {
    label: Option<Vec<u8>>,
    nonce: Option<Vec<u8>>,
    offset: Option<usize>,
    generation: Option<u32>,
    length: usize,
}

impl DerivedKeyParamsBuilder {
    /// Derivation label. Defaults to [`DEFAULT_LABEL`].
    #[must_use]
    pub fn label(mut self, label: impl Into<Vec<u8>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Nonce chosen by the deriving party. Required.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<Vec<u8>>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Absolute keystream offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Key generation (effective offset `generation * length`).
    #[must_use]
    pub fn generation(mut self, generation: u32) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Validate and produce the parameters.
    ///
    /// # Errors
    ///
    /// - `InvalidPosition` if both or neither of offset/generation were set
    /// - `InvalidLength` if length is zero
    /// - `EmptyNonce` if no nonce (or an empty one) was supplied
    /// - `OffsetTooLarge` if the effective offset overflows or exceeds
    ///   [`MAX_DERIVATION_OFFSET`]
    pub fn build(self) -> Result<DerivedKeyParams, DerivationError> {
        let position = match (self.offset, self.generation) {
            (Some(offset), None) => KeyPosition::Offset(offset),
            (None, Some(generation)) => KeyPosition::Generation(generation),
            (offset, generation) => {
                return Err(DerivationError::InvalidPosition { offset, generation });
            },
        };

        if self.length == 0 {
            return Err(DerivationError::InvalidLength { length_bits: 0 });
        }

        let nonce = match self.nonce {
            Some(nonce) if !nonce.is_empty() => nonce,
            _ => return Err(DerivationError::EmptyNonce),
        };

        let effective = match position {
            KeyPosition::Offset(offset) => Some(offset),
            KeyPosition::Generation(generation) => (generation as usize).checked_mul(self.length),
        };
        match effective {
            Some(offset) if offset <= MAX_DERIVATION_OFFSET => {},
            offset => {
                return Err(DerivationError::OffsetTooLarge { offset, max: MAX_DERIVATION_OFFSET });
            },
        }

        Ok(DerivedKeyParams {
            label: self.label.unwrap_or_else(|| DEFAULT_LABEL.to_vec()),
            nonce,
            position,
            length: self.length,
        })
    }
}

/// A key derived from a source key. Consumed immediately by a
/// message-protection operation; key bytes are zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    params: DerivedKeyParams,
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("params", &self.params)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl DerivedKey {
    /// Derive a key from `source_key` with validated parameters.
    ///
    /// # Errors
    ///
    /// - `KeyTooLong` if `params.length()` exceeds the source key length
    /// - `InvalidLength` if the length in bits does not fit in `u32`
    pub fn derive(source_key: &[u8], params: DerivedKeyParams) -> Result<Self, DerivationError> {
        let Some(length_bits) = u32::try_from(params.length)
            .ok()
            .and_then(|bytes| bytes.checked_mul(8))
        else {
            return Err(DerivationError::InvalidLength { length_bits: u32::MAX });
        };

        let key = derive(
            source_key,
            &params.label,
            &params.nonce,
            length_bits,
            params.effective_offset(),
        )?;

        Ok(Self { params, key })
    }

    /// Parameters this key was derived with.
    pub fn params(&self) -> &DerivedKeyParams {
        &self.params
    }

    /// Derived key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}
