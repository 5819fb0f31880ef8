//! Stable digests used for identifiers, plan hashes and memo keys.

use std::hash::Hasher;

use serde::Serialize;
use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher13;

use crate::errors::ExplanError;
use crate::serde::to_canonical_json_bytes;

/// Computes a stable SHA-256 hex digest for the provided serializable value.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, ExplanError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Returns the 128-bit digest of `text` as 32 lowercase hex characters.
pub fn digest128_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..16])
}

/// Derives a 64-bit key for the canonical encoding of `value`.
///
/// SipHash-1-3 with fixed zero keys, so keys are stable across runs and
/// platforms.
pub fn memo_key<T: Serialize>(value: &T) -> Result<u64, ExplanError> {
    let bytes = to_canonical_json_bytes(value)?;
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(&bytes);
    Ok(hasher.finish())
}
