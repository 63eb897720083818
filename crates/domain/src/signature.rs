//! HMAC-SHA256 helpers for gateway callback signatures and signed cookies.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message` keyed by `secret`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    // HMAC pads or hashes the key, so no key length is rejected.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature the gateway attaches to a capture callback:
/// `HMAC-SHA256(secret, order_id + "|" + payment_id)`.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    let payload = format!("{order_id}|{payment_id}");
    hmac_sha256_hex(secret.as_bytes(), payload.as_bytes())
}

/// Recomputes the callback signature and compares it in constant time.
pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let expected = payment_signature(secret, order_id, payment_id);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// Compare two byte slices in constant time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
