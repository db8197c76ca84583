//! Canonical cookie plaintext.
//!
//! ```text
//! ┌────────────────┬──────────────────────────────────────────────┐
//! │ version: u32 BE│ records, strictly increasing tag order       │
//! └────────────────┴──────────────────────────────────────────────┘
//! record = [tag: u8][len: u32 BE][value: len bytes]
//! ```
//!
//! | Tag | Field | Value |
//! | --- | --- | --- |
//! | 1 | context id | UTF-8, required |
//! | 2 | local id | UTF-8, optional |
//! | 3 | key kind | one byte, required |
//! | 4 | key | raw bytes, required (empty for bearer) |
//! | 5 | key generation | UTF-8, optional |
//! | 6 | token effective | i64 BE ticks, required |
//! | 7 | token expiry | i64 BE ticks, required |
//! | 8 | key effective | i64 BE ticks, required |
//! | 9 | key expiry | i64 BE ticks, required |
//! | 10 | claims | CBOR, required |
//!
//! Parsing rejects unknown, repeated and out-of-order tags, so every context
//! has exactly one encoding.

use sessionframe_crypto::Zeroizing;

use super::error::{CookieError, InvalidCookieReason};
use crate::{
    context::{ClaimSet, ContextId, KeyGeneration, KeyKind, SecurityContext},
    time::Timestamp,
};

/// Format version written by this codec.
pub const COOKIE_FORMAT_VERSION: u32 = 1;

const TAG_CONTEXT_ID: u8 = 1;
const TAG_LOCAL_ID: u8 = 2;
const TAG_KEY_KIND: u8 = 3;
const TAG_KEY: u8 = 4;
const TAG_KEY_GENERATION: u8 = 5;
const TAG_TOKEN_EFFECTIVE: u8 = 6;
const TAG_TOKEN_EXPIRY: u8 = 7;
const TAG_KEY_EFFECTIVE: u8 = 8;
const TAG_KEY_EXPIRY: u8 = 9;
const TAG_CLAIMS: u8 = 10;

const RECORD_HEADER_SIZE: usize = 5;

/// Fields recovered from a cookie, before context validation.
pub(crate) struct CookieFields {
    pub context_id: ContextId,
    pub local_id: Option<String>,
    pub key_kind: KeyKind,
    pub key: Zeroizing<Vec<u8>>,
    pub key_generation: Option<KeyGeneration>,
    pub token_valid_from: Timestamp,
    pub token_valid_to: Timestamp,
    pub key_valid_from: Timestamp,
    pub key_valid_to: Timestamp,
    pub claims: Vec<ClaimSet>,
}

/// Canonical bytes for `context`.
pub(crate) fn encode_fields(context: &SecurityContext) -> Result<Zeroizing<Vec<u8>>, CookieError> {
    let key = context.key().map_err(|err| CookieError::Encode(err.to_string()))?;

    let mut claims = Vec::new();
    ciborium::into_writer(&**context.claims(), &mut claims)
        .map_err(|err| CookieError::Encode(format!("claims: {err}")))?;

    let mut out = Zeroizing::new(Vec::with_capacity(128 + key.len() + claims.len()));
    out.extend_from_slice(&COOKIE_FORMAT_VERSION.to_be_bytes());

    write_record(&mut out, TAG_CONTEXT_ID, context.context_id().as_str().as_bytes())?;
    if let Some(local_id) = context.local_id() {
        write_record(&mut out, TAG_LOCAL_ID, local_id.as_bytes())?;
    }
    write_record(&mut out, TAG_KEY_KIND, &[context.key_kind().to_u8()])?;
    write_record(&mut out, TAG_KEY, &key)?;
    if let Some(generation) = context.key_generation() {
        write_record(&mut out, TAG_KEY_GENERATION, generation.as_str().as_bytes())?;
    }
    write_record(&mut out, TAG_TOKEN_EFFECTIVE, &context.token_valid_from().ticks().to_be_bytes())?;
    write_record(&mut out, TAG_TOKEN_EXPIRY, &context.token_valid_to().ticks().to_be_bytes())?;
    write_record(&mut out, TAG_KEY_EFFECTIVE, &context.key_valid_from().ticks().to_be_bytes())?;
    write_record(&mut out, TAG_KEY_EXPIRY, &context.key_valid_to().ticks().to_be_bytes())?;
    write_record(&mut out, TAG_CLAIMS, &claims)?;

    Ok(out)
}

fn write_record(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<(), CookieError> {
    let len = u32::try_from(value.len())
        .map_err(|_| CookieError::Encode(format!("field {tag} too large")))?;
    out.push(tag);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    Ok(())
}

/// Parse canonical bytes.
pub(crate) fn decode_fields(bytes: &[u8]) -> Result<CookieFields, CookieError> {
    let Some((version, mut rest)) = bytes.split_first_chunk::<4>() else {
        return Err(InvalidCookieReason::Truncated { field: "version" }.into());
    };
    let version = u32::from_be_bytes(*version);
    if version != COOKIE_FORMAT_VERSION {
        return Err(CookieError::UnsupportedVersion {
            found: version,
            expected: COOKIE_FORMAT_VERSION,
        });
    }

    let mut context_id = None;
    let mut local_id = None;
    let mut key_kind = None;
    let mut key = None;
    let mut key_generation = None;
    let mut token_valid_from = None;
    let mut token_valid_to = None;
    let mut key_valid_from = None;
    let mut key_valid_to = None;
    let mut claims = None;

    let mut last_tag = 0u8;
    while !rest.is_empty() {
        if rest.len() < RECORD_HEADER_SIZE {
            return Err(InvalidCookieReason::Truncated { field: "record header" }.into());
        }
        let tag = rest[0];
        let len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
        rest = &rest[RECORD_HEADER_SIZE..];

        if !(TAG_CONTEXT_ID..=TAG_CLAIMS).contains(&tag) {
            return Err(InvalidCookieReason::UnknownField { tag }.into());
        }
        if tag <= last_tag {
            return Err(InvalidCookieReason::UnorderedField { tag }.into());
        }
        last_tag = tag;

        let field = field_name(tag);
        if rest.len() < len {
            return Err(InvalidCookieReason::Truncated { field }.into());
        }
        let (value, tail) = rest.split_at(len);
        rest = tail;

        match tag {
            TAG_CONTEXT_ID => {
                let id = utf8(value, field)?;
                if id.is_empty() {
                    return Err(InvalidCookieReason::MalformedField { field }.into());
                }
                context_id = Some(ContextId::new(id));
            },
            TAG_LOCAL_ID => local_id = Some(utf8(value, field)?),
            TAG_KEY_KIND => {
                let kind = match value {
                    [byte] => KeyKind::from_u8(*byte),
                    _ => None,
                };
                key_kind = Some(kind.ok_or(InvalidCookieReason::MalformedField { field })?);
            },
            TAG_KEY => key = Some(Zeroizing::new(value.to_vec())),
            TAG_KEY_GENERATION => key_generation = Some(KeyGeneration::new(utf8(value, field)?)),
            TAG_TOKEN_EFFECTIVE => token_valid_from = Some(timestamp(value, field)?),
            TAG_TOKEN_EXPIRY => token_valid_to = Some(timestamp(value, field)?),
            TAG_KEY_EFFECTIVE => key_valid_from = Some(timestamp(value, field)?),
            TAG_KEY_EXPIRY => key_valid_to = Some(timestamp(value, field)?),
            _ => claims = Some(claim_sets(value, field)?),
        }
    }

    Ok(CookieFields {
        context_id: required(context_id, TAG_CONTEXT_ID)?,
        local_id,
        key_kind: required(key_kind, TAG_KEY_KIND)?,
        key: required(key, TAG_KEY)?,
        key_generation,
        token_valid_from: required(token_valid_from, TAG_TOKEN_EFFECTIVE)?,
        token_valid_to: required(token_valid_to, TAG_TOKEN_EXPIRY)?,
        key_valid_from: required(key_valid_from, TAG_KEY_EFFECTIVE)?,
        key_valid_to: required(key_valid_to, TAG_KEY_EXPIRY)?,
        claims: required(claims, TAG_CLAIMS)?,
    })
}

fn field_name(tag: u8) -> &'static str {
    match tag {
        TAG_CONTEXT_ID => "context id",
        TAG_LOCAL_ID => "local id",
        TAG_KEY_KIND => "key kind",
        TAG_KEY => "key",
        TAG_KEY_GENERATION => "key generation",
        TAG_TOKEN_EFFECTIVE => "token effective time",
        TAG_TOKEN_EXPIRY => "token expiry time",
        TAG_KEY_EFFECTIVE => "key effective time",
        TAG_KEY_EXPIRY => "key expiry time",
        TAG_CLAIMS => "claims",
        _ => "unknown",
    }
}

fn required<T>(value: Option<T>, tag: u8) -> Result<T, CookieError> {
    value.ok_or_else(|| InvalidCookieReason::MissingField { field: field_name(tag) }.into())
}

fn utf8(value: &[u8], field: &'static str) -> Result<String, CookieError> {
    String::from_utf8(value.to_vec())
        .map_err(|_| InvalidCookieReason::MalformedField { field }.into())
}

/// Decode the claims record, which must hold exactly one CBOR value.
fn claim_sets(value: &[u8], field: &'static str) -> Result<Vec<ClaimSet>, CookieError> {
    let mut reader = value;
    let claims: Vec<ClaimSet> = ciborium::from_reader(&mut reader)
        .map_err(|_| InvalidCookieReason::MalformedField { field })?;
    if !reader.is_empty() {
        return Err(InvalidCookieReason::MalformedField { field }.into());
    }
    Ok(claims)
}

fn timestamp(value: &[u8], field: &'static str) -> Result<Timestamp, CookieError> {
    let bytes: [u8; 8] =
        value.try_into().map_err(|_| InvalidCookieReason::MalformedField { field })?;
    Ok(Timestamp::from_ticks(i64::from_be_bytes(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Claim, ProofKey};

    fn sample() -> SecurityContext {
        SecurityContext::builder(
            ContextId::new("urn:uuid:00000000-0000-4000-8000-000000000001"),
            KeyKind::Symmetric,
            ProofKey::eager(vec![0x42; 32]),
            Timestamp::from_unix_secs(100),
            Timestamp::from_unix_secs(200),
        )
        .local_id("local-1")
        .key_generation(KeyGeneration::new("gen-1"))
        .key_window(Timestamp::from_unix_secs(110), Timestamp::from_unix_secs(150))
        .claims(vec![ClaimSet::new("issuer", vec![Claim::new("name", "alice")])])
        .build()
        .unwrap()
    }

    fn record(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn fields_survive_encoding() {
        let ctx = sample();
        let bytes = encode_fields(&ctx).unwrap();
        let fields = decode_fields(&bytes).unwrap();

        assert_eq!(&fields.context_id, ctx.context_id());
        assert_eq!(fields.local_id.as_deref(), Some("local-1"));
        assert_eq!(fields.key_kind, KeyKind::Symmetric);
        assert_eq!(fields.key.as_slice(), &[0x42; 32]);
        assert_eq!(fields.key_generation.as_ref(), ctx.key_generation());
        assert_eq!(fields.key_valid_from, Timestamp::from_unix_secs(110));
        assert_eq!(fields.claims.as_slice(), &**ctx.claims());
    }

    #[test]
    fn trailing_bytes_after_claims_rejected() {
        let ctx = sample();
        let bytes = encode_fields(&ctx).unwrap();

        let mut claims = Vec::new();
        ciborium::into_writer(&**ctx.claims(), &mut claims).unwrap();
        let record_start = bytes.len() - claims.len() - RECORD_HEADER_SIZE;
        assert_eq!(bytes[record_start], TAG_CLAIMS);

        let mut padded_claims = claims.clone();
        padded_claims.push(0x00);
        let mut padded = bytes[..record_start].to_vec();
        padded.extend(record(TAG_CLAIMS, &padded_claims));

        assert!(decode_fields(&bytes).is_ok());
        assert!(matches!(
            decode_fields(&padded),
            Err(CookieError::InvalidCookie(InvalidCookieReason::MalformedField {
                field: "claims"
            }))
        ));
    }

    #[test]
    fn encoding_starts_with_version() {
        let bytes = encode_fields(&sample()).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(bytes[4], TAG_CONTEXT_ID);
    }

    #[test]
    fn wrong_version_rejected() {
        let mut bytes = encode_fields(&sample()).unwrap();
        bytes[3] = 2;
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn empty_input_truncated() {
        assert!(matches!(
            decode_fields(&[0, 0]),
            Err(CookieError::InvalidCookie(InvalidCookieReason::Truncated { field: "version" }))
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.extend(record(11, b"x"));
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::UnknownField { tag: 11 }))
        ));
    }

    #[test]
    fn duplicate_tag_rejected() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.extend(record(TAG_CONTEXT_ID, b"a"));
        bytes.extend(record(TAG_CONTEXT_ID, b"b"));
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::UnorderedField { tag: 1 }))
        ));
    }

    #[test]
    fn out_of_order_tag_rejected() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.extend(record(TAG_KEY, b""));
        bytes.extend(record(TAG_CONTEXT_ID, b"a"));
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::UnorderedField { tag: 1 }))
        ));
    }

    #[test]
    fn overlong_record_truncated() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.push(TAG_CONTEXT_ID);
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"short");
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::Truncated { field: "context id" }))
        ));
    }

    #[test]
    fn missing_key_reported() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.extend(record(TAG_CONTEXT_ID, b"a"));
        bytes.extend(record(TAG_KEY_KIND, &[1]));
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::MissingField { field: "key" }))
        ));
    }

    #[test]
    fn short_timestamp_malformed() {
        let mut bytes = COOKIE_FORMAT_VERSION.to_be_bytes().to_vec();
        bytes.extend(record(TAG_CONTEXT_ID, b"a"));
        bytes.extend(record(TAG_KEY_KIND, &[1]));
        bytes.extend(record(TAG_KEY, &[0; 16]));
        bytes.extend(record(TAG_TOKEN_EFFECTIVE, &[0; 4]));
        assert!(matches!(
            decode_fields(&bytes),
            Err(CookieError::InvalidCookie(InvalidCookieReason::MalformedField {
                field: "token effective time"
            }))
        ));
    }
}
