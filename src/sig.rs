//! Keyed-MAC signing for wire frames.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 over the UTF-8 bytes of `body`.
pub fn sign(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify `sig` against `body`.
///
/// Trailing `\r`, `\n`, and spaces on the signature are stripped first so
/// line-ending normalization by intermediate readers cannot fail a valid
/// frame. The comparison itself is constant-time.
pub fn verify(secret: &str, body: &str, sig: &str) -> bool {
    let sig = sig.trim_end_matches(['\r', '\n', ' ']);
    let Ok(raw) = hex::decode(sig) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    mac.verify_slice(&raw).is_ok()
}
