//! Webhook signature verification.
//!
//! The ATS signs each delivery with HMAC-SHA256 over the raw request body.
//! Verification must run on the exact bytes received, before any JSON
//! parsing, since re-serialization is not byte-identical.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the hex-encoded `Signature` header against the raw body.
/// Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let Ok(expected) = hex::decode(provided.trim()) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"payload":{"application":{"id":555}}}"#;
        let signature = sign("test-secret", body);
        assert!(verify_signature("test-secret", body, &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let signature = sign("other-secret", body);
        assert!(!verify_signature("test-secret", body, &signature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("test-secret", b"original");
        assert!(!verify_signature("test-secret", b"tampered", &signature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_signature("test-secret", b"body", "not hex at all"));
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let expected = "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8";
        assert!(verify_signature(
            "key",
            b"The quick brown fox jumps over the lazy dog",
            expected
        ));
    }
}
