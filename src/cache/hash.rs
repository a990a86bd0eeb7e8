//! Digest truncation used to turn cache tags into surrogate keys.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::domain::types::HashLength;

/// Truncated base64 MD5 of `input`.
///
/// The output is a pure function of `(input, length)` and is what gets stored
/// on cached objects, so changing the algorithm orphans every existing key.
/// MD5 is used for spread only, not integrity.
pub fn hash_input(input: &str, length: HashLength) -> String {
    let digest = md5::compute(input.as_bytes());
    let mut encoded = STANDARD.encode(digest.0);
    encoded.truncate(length.get());
    encoded
}
