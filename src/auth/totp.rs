//! Time-based one-time passwords (RFC 6238) over HMAC-SHA-256.
//!
//! The same primitive backs both emailed codes (long period, hard expiry on
//! the verification row) and authenticator-app 2FA codes (30s period, no
//! expiry). Secrets are stored base64url-encoded in the `verification`
//! table; the algorithm is recorded per row so it can evolve without a
//! migration.

use crate::error::QuillError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const ALGORITHM: &str = "SHA-256";

const SECRET_LEN: usize = 32;

/// Fresh random HMAC key, base64url-encoded for storage.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hotp(key: &[u8], counter: u64, digits: u32) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation per RFC 4226 §5.3.
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let bin = (u32::from(digest[offset]) & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);

    let code = bin % 10u32.pow(digits);
    format!("{code:0width$}", width = digits as usize)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, QuillError> {
    URL_SAFE_NO_PAD
        .decode(secret)
        .map_err(|e| QuillError::Unexpected(format!("malformed verification secret: {e}")))
}

/// The code valid at `unix_time` for the given secret.
pub fn code_at(
    secret: &str,
    unix_time: i64,
    period_secs: u64,
    digits: u32,
) -> Result<String, QuillError> {
    let key = decode_secret(secret)?;
    let period = i64::try_from(period_secs).unwrap_or(i64::MAX).max(1);
    let counter = u64::try_from((unix_time / period).max(0)).unwrap_or(0);
    Ok(hotp(&key, counter, digits))
}

/// Check a submitted code within a ±1 step window, in constant time per
/// candidate.
pub fn verify_code(
    secret: &str,
    submitted: &str,
    unix_time: i64,
    period_secs: u64,
    digits: u32,
) -> Result<bool, QuillError> {
    let period = i64::try_from(period_secs).unwrap_or(i64::MAX).max(1);
    let mut matched = false;
    for step in [-1i64, 0, 1] {
        let candidate = code_at(secret, unix_time + step * period, period_secs, digits)?;
        matched |= bool::from(candidate.as_bytes().ct_eq(submitted.as_bytes()));
    }
    Ok(matched)
}
