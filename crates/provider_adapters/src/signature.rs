//! Shared webhook signature primitives
//!
//! HMAC-SHA256 helpers with constant-time comparison. Every HMAC-style
//! scheme in this crate goes through [`verify_hmac_hex`] so no adapter can
//! accidentally introduce a timing side channel with `==` on signature
//! bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes HMAC-SHA256 over `message`
pub(crate) fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies a hex-encoded HMAC-SHA256 signature in constant time
pub(crate) fn verify_hmac_hex(secret: &[u8], message: &[u8], provided_hex: &str) -> bool {
    let Some(provided) = hex_decode(provided_hex.trim()) else {
        return false;
    };
    let expected = hmac_sha256(secret, message);
    expected.ct_eq(provided.as_slice()).unwrap_u8() == 1
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub(crate) fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
