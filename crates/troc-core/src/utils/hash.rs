//! Credential hashing and tarball integrity checks.

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{TrocError, TrocResult};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of a password keyed by the gateway secret, hex encoded
pub fn hash_password(secret: &str, password: &str) -> TrocResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TrocError::Validation(format!("HMAC key error: {}", e)))?;
    mac.update(password.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a password against a stored hash in constant time
pub fn verify_password(secret: &str, password: &str, expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(password.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Random bearer token, 32 bytes hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Verify a published tarball against the `dist` fields npm sent with it.
/// `integrity` (sha512 SRI) is preferred; `shasum` (sha1 hex) is the fallback.
pub fn verify_tarball_integrity(
    bytes: &[u8],
    shasum: Option<&str>,
    integrity: Option<&str>,
) -> TrocResult<()> {
    if let Some(expected) = integrity.and_then(|i| i.strip_prefix("sha512-")) {
        let actual = general_purpose::STANDARD.encode(Sha512::digest(bytes));
        if actual != expected {
            return Err(TrocError::Validation(format!(
                "integrity mismatch: expected sha512-{}, got sha512-{}",
                expected, actual
            )));
        }
        return Ok(());
    }

    if let Some(expected) = shasum {
        let actual = hex::encode(Sha1::digest(bytes));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(TrocError::Validation(format!(
                "shasum mismatch: expected {}, got {}",
                expected, actual
            )));
        }
    }

    Ok(())
}
