//! Webhook signature verification.
//!
//! The provider signs every callback: `HMAC-SHA256(signing_secret,
//! full_url ‖ sorted form params)`, base64-encoded, in the
//! `X-Provider-Signature` header. Parameters are concatenated as
//! `key` followed by `value`, sorted by key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header the provider puts the signature in.
pub const SIGNATURE_HEADER: &str = "X-Provider-Signature";

/// Computes the expected signature for a callback.
pub fn compute_signature(secret: &str, full_url: &str, form_params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = form_params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(full_url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    BASE64.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a presented signature.
pub fn verify_signature(
    secret: &str,
    full_url: &str,
    form_params: &[(String, String)],
    presented: &str,
) -> bool {
    let Ok(presented_bytes) = BASE64.decode(presented) else {
        return false;
    };

    let mut sorted: Vec<&(String, String)> = form_params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(full_url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    mac.verify_slice(&presented_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("providerSid".to_string(), "CA1".to_string()),
            ("providerStatus".to_string(), "completed".to_string()),
            ("duration".to_string(), "42".to_string()),
        ]
    }

    #[test]
    fn signature_round_trips() {
        let url = "https://host/broadcast/c-1/status";
        let sig = compute_signature("secret", url, &params());
        assert!(verify_signature("secret", url, &params(), &sig));
    }

    #[test]
    fn signature_is_order_insensitive_for_params() {
        let url = "https://host/broadcast/c-1/status";
        let mut reversed = params();
        reversed.reverse();
        assert_eq!(
            compute_signature("secret", url, &params()),
            compute_signature("secret", url, &reversed)
        );
    }

    #[test]
    fn tampering_breaks_verification() {
        let url = "https://host/broadcast/c-1/status";
        let sig = compute_signature("secret", url, &params());

        let mut tampered = params();
        tampered[2].1 = "43".to_string();
        assert!(!verify_signature("secret", url, &tampered, &sig));
        assert!(!verify_signature("secret", "https://host/other", &params(), &sig));
        assert!(!verify_signature("other-secret", url, &params(), &sig));
        assert!(!verify_signature("secret", url, &params(), "not-base64!!"));
    }
}
