// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a hex-encoded HMAC-SHA256 signature over `payload`.
///
/// Accepts both bare hex digests and the `sha256=<hex>` header form. The
/// digest comparison is constant-time.
pub fn verify_hmac_sha256(payload: &[u8], signature: &str, secret: &[u8]) -> bool {
    let hex_digest = signature
        .trim()
        .strip_prefix("sha256=")
        .unwrap_or(signature.trim());
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the `sha256=<hex>` signature header value for `payload`.
pub fn sign_hmac_sha256(payload: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).unwrap_or_else(|_| unreachable!());
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
