//! crates/killfeed_core/src/verification.rs
//!
//! Issues and checks emailed one-time codes for onboarding and password resets.
//!
//! A code is only as good as the secret stored for its (type, target) pair, so
//! issuing a new code implicitly voids any outstanding one. A successfully checked
//! secret is left in place; it expires with the staging window or is replaced by
//! the next `issue`. Each wrong code counts against the secret; once
//! `MAX_FAILED_ATTEMPTS` is reached every code is refused until a new one is issued.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::{VerificationSecret, VerificationType};
use crate::error::{SiteError, SiteResult};
use crate::ports::DatabaseService;
use crate::totp;

/// How long a staged flow (and the secret behind it) stays valid.
pub const STAGING_WINDOW_MINUTES: i64 = 30;

/// Wrong codes tolerated per issued secret.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct VerificationFlow {
    db: Arc<dyn DatabaseService>,
    ttl: Duration,
}

impl VerificationFlow {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self {
            db,
            ttl: Duration::minutes(STAGING_WINDOW_MINUTES),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, kind: VerificationType, target: &str) -> SiteResult<String> {
        self.issue_at(kind, target, Utc::now()).await
    }

    /// Generates a fresh secret for (kind, target), replacing any previous one, and
    /// returns the code that is valid at `now`.
    pub async fn issue_at(
        &self,
        kind: VerificationType,
        target: &str,
        now: DateTime<Utc>,
    ) -> SiteResult<String> {
        let config = totp::generate_config();
        let otp = totp::generate_code(&config, now.timestamp())
            .map_err(|e| SiteError::Internal(e.to_string()))?;

        let secret = VerificationSecret {
            kind,
            target: normalize_target(target),
            config,
            created_at: now,
            expires_at: now + self.ttl,
            attempts: 0,
        };
        self.db.upsert_verification(&secret).await?;

        info!(kind = kind.as_str(), target = %secret.target, "Issued verification code");
        Ok(otp)
    }

    pub async fn verify(
        &self,
        kind: VerificationType,
        target: &str,
        candidate: &str,
    ) -> SiteResult<bool> {
        self.verify_at(kind, target, candidate, Utc::now()).await
    }

    /// Fails closed: no secret on file, an expired one, or one locked out by too
    /// many wrong codes is simply `false`.
    pub async fn verify_at(
        &self,
        kind: VerificationType,
        target: &str,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> SiteResult<bool> {
        let target = normalize_target(target);
        let Some(secret) = self.db.get_verification(kind, &target).await? else {
            debug!(kind = kind.as_str(), %target, "No verification secret on file");
            return Ok(false);
        };
        if secret.expires_at <= now {
            debug!(kind = kind.as_str(), %target, "Verification secret expired");
            return Ok(false);
        }

        if secret.attempts >= MAX_FAILED_ATTEMPTS {
            debug!(kind = kind.as_str(), %target, "Verification secret locked out");
            return Ok(false);
        }

        let valid =
            totp::verify_code(&secret.config, candidate, now.timestamp(), totp::DEFAULT_WINDOW)
                .map_err(|e| SiteError::Internal(e.to_string()))?;
        if !valid {
            let attempts = self.db.record_failed_verification(kind, &target).await?;
            if attempts >= MAX_FAILED_ATTEMPTS {
                warn!(kind = kind.as_str(), %target, attempts, "Too many wrong verification codes");
            }
        }
        Ok(valid)
    }
}

fn normalize_target(target: &str) -> String {
    target.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    fn flow() -> (VerificationFlow, InMemoryStore) {
        let store = InMemoryStore::new();
        (VerificationFlow::new(Arc::new(store.clone())), store)
    }

    fn wrong(code: &str) -> String {
        code.chars()
            .map(|c| if c == '9' { '0' } else { '9' })
            .collect()
    }

    #[tokio::test]
    async fn issued_code_verifies() {
        let (flow, _) = flow();
        let otp = flow
            .issue(VerificationType::Onboarding, "Fan@Example.com")
            .await
            .unwrap();

        assert!(flow
            .verify(VerificationType::Onboarding, "fan@example.com", &otp)
            .await
            .unwrap());
        // Success does not consume the secret.
        assert!(flow
            .verify(VerificationType::Onboarding, "fan@example.com", &otp)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn wrong_code_or_type_is_rejected() {
        let (flow, _) = flow();
        let otp = flow
            .issue(VerificationType::Onboarding, "fan@example.com")
            .await
            .unwrap();

        assert!(!flow
            .verify(VerificationType::Onboarding, "fan@example.com", &wrong(&otp))
            .await
            .unwrap());
        assert!(!flow
            .verify(VerificationType::ResetPassword, "fan@example.com", &otp)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_secret_fails_closed() {
        let (flow, _) = flow();
        assert!(!flow
            .verify(VerificationType::ResetPassword, "nobody@example.com", "123456")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn reissuing_voids_the_previous_code() {
        let (flow, _) = flow();
        let now = Utc::now();
        let first = flow
            .issue_at(VerificationType::Onboarding, "fan@example.com", now)
            .await
            .unwrap();
        let second = flow
            .issue_at(VerificationType::Onboarding, "fan@example.com", now)
            .await
            .unwrap();

        assert!(flow
            .verify_at(VerificationType::Onboarding, "fan@example.com", &second, now)
            .await
            .unwrap());
        if first != second {
            assert!(!flow
                .verify_at(VerificationType::Onboarding, "fan@example.com", &first, now)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn code_tolerates_one_period_of_skew() {
        let (flow, _) = flow();
        let now = Utc::now();
        let otp = flow
            .issue_at(VerificationType::Onboarding, "fan@example.com", now)
            .await
            .unwrap();
        let period = Duration::seconds(totp::DEFAULT_PERIOD_SECS as i64);

        for skew in [now - period, now + period] {
            assert!(flow
                .verify_at(VerificationType::Onboarding, "fan@example.com", &otp, skew)
                .await
                .unwrap());
        }
        for skew in [now - period * 2, now + period * 2] {
            assert!(!flow
                .verify_at(VerificationType::Onboarding, "fan@example.com", &otp, skew)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn repeated_wrong_codes_lock_the_secret_until_reissued() {
        let (flow, store) = flow();
        let now = Utc::now();
        let otp = flow
            .issue_at(VerificationType::ResetPassword, "fan@example.com", now)
            .await
            .unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert!(!flow
                .verify_at(VerificationType::ResetPassword, "fan@example.com", &wrong(&otp), now)
                .await
                .unwrap());
        }
        let secret = store
            .get_verification(VerificationType::ResetPassword, "fan@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(secret.attempts, MAX_FAILED_ATTEMPTS);
        assert!(!flow
            .verify_at(VerificationType::ResetPassword, "fan@example.com", &otp, now)
            .await
            .unwrap());

        let fresh = flow
            .issue_at(VerificationType::ResetPassword, "fan@example.com", now)
            .await
            .unwrap();
        assert!(flow
            .verify_at(VerificationType::ResetPassword, "fan@example.com", &fresh, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn correct_code_does_not_count_against_the_limit() {
        let (flow, store) = flow();
        let now = Utc::now();
        let otp = flow
            .issue_at(VerificationType::Onboarding, "fan@example.com", now)
            .await
            .unwrap();

        for _ in 0..MAX_FAILED_ATTEMPTS + 1 {
            assert!(flow
                .verify_at(VerificationType::Onboarding, "fan@example.com", &otp, now)
                .await
                .unwrap());
        }
        let secret = store
            .get_verification(VerificationType::Onboarding, "fan@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(secret.attempts, 0);
    }

    #[tokio::test]
    async fn expired_secret_is_rejected() {
        let (flow, _) = flow();
        let now = Utc::now();
        let otp = flow
            .issue_at(VerificationType::ResetPassword, "fan@example.com", now)
            .await
            .unwrap();

        let later = now + flow.ttl() + Duration::seconds(1);
        assert!(!flow
            .verify_at(VerificationType::ResetPassword, "fan@example.com", &otp, later)
            .await
            .unwrap());
    }
}
