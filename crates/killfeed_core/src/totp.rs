//! crates/killfeed_core/src/totp.rs
//!
//! Time-based one-time codes (RFC 4226 HOTP stepped by RFC 6238 time windows),
//! rendered in a configurable alphabet.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::domain::{TotpAlgorithm, TotpConfig};

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_CHAR_SET: &str = "0123456789";
/// Emailed codes have to survive a trip through an inbox.
pub const DEFAULT_PERIOD_SECS: u64 = 10 * 60;
/// Steps accepted on either side of the current one.
pub const DEFAULT_WINDOW: u64 = 1;
const SECRET_BYTES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("invalid TOTP configuration: {0}")]
    InvalidConfig(String),
}

/// A fresh configuration with a random secret and the default parameters.
pub fn generate_config() -> TotpConfig {
    let mut secret = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    TotpConfig {
        secret: hex::encode(secret),
        algorithm: TotpAlgorithm::Sha256,
        digits: DEFAULT_DIGITS,
        char_set: DEFAULT_CHAR_SET.to_string(),
        period: DEFAULT_PERIOD_SECS,
    }
}

/// The code for the time step containing `unix_secs`.
pub fn generate_code(config: &TotpConfig, unix_secs: i64) -> Result<String, TotpError> {
    hotp(config, step_at(config, unix_secs)?)
}

/// Checks `candidate` against the current step and `window` steps before and after it.
/// Every step in the window is compared in constant time.
pub fn verify_code(
    config: &TotpConfig,
    candidate: &str,
    unix_secs: i64,
    window: u64,
) -> Result<bool, TotpError> {
    let candidate = candidate.trim();
    if candidate.chars().count() != config.digits as usize {
        return Ok(false);
    }

    let current = step_at(config, unix_secs)?;
    let first = current.saturating_sub(window);
    let mut matched = 0u8;
    for step in first..=current.saturating_add(window) {
        matched |= codes_match(&hotp(config, step)?, candidate);
    }
    Ok(matched == 1)
}

fn codes_match(expected: &str, candidate: &str) -> u8 {
    let expected = expected.as_bytes();
    let candidate = candidate.as_bytes();
    if expected.len() != candidate.len() {
        return 0;
    }
    expected.ct_eq(candidate).unwrap_u8()
}

fn step_at(config: &TotpConfig, unix_secs: i64) -> Result<u64, TotpError> {
    if config.period == 0 {
        return Err(TotpError::InvalidConfig("period must be positive".into()));
    }
    Ok(unix_secs.max(0) as u64 / config.period)
}

/// HOTP value for one counter, rendered with `config.char_set`.
pub fn hotp(config: &TotpConfig, counter: u64) -> Result<String, TotpError> {
    let key = hex::decode(&config.secret).map_err(|e| TotpError::InvalidSecret(e.to_string()))?;
    let message = counter.to_be_bytes();

    let digest = match config.algorithm {
        TotpAlgorithm::Sha1 => sign::<Hmac<Sha1>>(&key, &message)?,
        TotpAlgorithm::Sha256 => sign::<Hmac<Sha256>>(&key, &message)?,
        TotpAlgorithm::Sha512 => sign::<Hmac<Sha512>>(&key, &message)?,
    };

    // Dynamic truncation (RFC 4226 §5.3).
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    render(u64::from(binary), config)
}

fn sign<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> Result<Vec<u8>, TotpError> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Writes the lowest `digits` places of `value` in base `char_set.len()`.
/// With a decimal alphabet this is the usual zero-padded `value % 10^digits`.
fn render(mut value: u64, config: &TotpConfig) -> Result<String, TotpError> {
    let alphabet: Vec<char> = config.char_set.chars().collect();
    if alphabet.len() < 2 {
        return Err(TotpError::InvalidConfig(
            "character set needs at least two symbols".into(),
        ));
    }
    if config.digits == 0 {
        return Err(TotpError::InvalidConfig("digits must be positive".into()));
    }

    let base = alphabet.len() as u64;
    let mut out = Vec::with_capacity(config.digits as usize);
    for _ in 0..config.digits {
        out.push(alphabet[(value % base) as usize]);
        value /= base;
    }
    Ok(out.into_iter().rev().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4226 Appendix D / RFC 6238 Appendix B secret: ASCII "12345678901234567890".
    fn rfc_config(digits: u32, period: u64) -> TotpConfig {
        TotpConfig {
            secret: hex::encode(b"12345678901234567890"),
            algorithm: TotpAlgorithm::Sha1,
            digits,
            char_set: DEFAULT_CHAR_SET.to_string(),
            period,
        }
    }

    #[test]
    fn hotp_matches_rfc4226_vectors() {
        let config = rfc_config(6, 30);
        let expected = ["755224", "287082", "359152", "969429", "338314"];
        for (counter, code) in expected.iter().enumerate() {
            assert_eq!(hotp(&config, counter as u64).unwrap(), *code);
        }
    }

    #[test]
    fn totp_matches_rfc6238_sha1_vectors() {
        let config = rfc_config(8, 30);
        assert_eq!(generate_code(&config, 59).unwrap(), "94287082");
        assert_eq!(generate_code(&config, 1_111_111_109).unwrap(), "07081804");
    }

    #[test]
    fn generated_code_verifies_within_window() {
        let config = generate_config();
        let now = 1_700_000_000;
        let code = generate_code(&config, now).unwrap();

        let period = config.period as i64;

        assert!(verify_code(&config, &code, now, DEFAULT_WINDOW).unwrap());
        assert!(verify_code(&config, &code, now - period, DEFAULT_WINDOW).unwrap());
        assert!(verify_code(&config, &code, now + period, DEFAULT_WINDOW).unwrap());
        assert!(!verify_code(&config, &code, now - 2 * period, DEFAULT_WINDOW).unwrap());
        assert!(!verify_code(&config, &code, now + 2 * period, DEFAULT_WINDOW).unwrap());
    }

    #[test]
    fn zero_window_accepts_only_the_current_step() {
        let config = rfc_config(8, 30);
        assert!(verify_code(&config, "94287082", 59, 0).unwrap());
        assert!(!verify_code(&config, "94287082", 89, 0).unwrap());
        assert!(!verify_code(&config, "94287082", 29, 0).unwrap());
    }

    #[test]
    fn code_comparison_needs_every_symbol() {
        assert_eq!(codes_match("123456", "123456"), 1);
        assert_eq!(codes_match("123456", "123457"), 0);
        assert_eq!(codes_match("123456", "12345"), 0);
        let config = rfc_config(6, 30);
        assert!(!verify_code(&config, "755225", 0, 0).unwrap());
        assert!(verify_code(&config, "755224", 0, 0).unwrap());
    }

    #[test]
    fn wrong_length_is_rejected_without_hashing() {
        let config = generate_config();
        assert!(!verify_code(&config, "123", 0, DEFAULT_WINDOW).unwrap());
    }

    #[test]
    fn custom_alphabet_is_respected() {
        let mut config = generate_config();
        config.char_set = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".to_string();
        let code = generate_code(&config, 42).unwrap();
        assert_eq!(code.len(), DEFAULT_DIGITS as usize);
        assert!(code.chars().all(|c| config.char_set.contains(c)));
    }

    #[test]
    fn bad_secret_is_an_error() {
        let mut config = generate_config();
        config.secret = "not-hex".to_string();
        assert!(matches!(hotp(&config, 0), Err(TotpError::InvalidSecret(_))));
    }
}
