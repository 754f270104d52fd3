//! HMAC-SHA256 payload signing.
//!
//! Subscriptions with a signing secret get an `X-Webhook-Signature` header
//! so receivers can verify the payload was produced by the platform and not
//! tampered with in transit.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeliveryError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Computes the lowercase hex HMAC-SHA256 of the raw payload body.
///
/// # Errors
///
/// Returns `DeliveryError::Configuration` if the secret cannot be used as
/// an HMAC key.
pub fn sign_payload(secret: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::configuration(format!("invalid signing secret: {e}")))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex signature against the raw payload body in constant time.
pub fn verify_signature(secret: &str, body: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
