//! Webhook signature verification.
//!
//! Payments are settled on the processor's word alone, so every inbound
//! event must prove it came from the processor: an HMAC-SHA256 over the
//! raw request body, hex-encoded, keyed with the shared endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies (and, for tests and local tools, produces) webhook signatures.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    /// Creates a verifier from the shared endpoint secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the hex-encoded signature for a payload.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a signature against a payload in constant time.
    ///
    /// Malformed hex is treated as a mismatch, not an error, so callers
    /// reject it the same way they reject a wrong signature.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if expected.len() != provided.len() {
            return false;
        }
        expected.as_slice().ct_eq(provided.as_slice()).into()
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}
