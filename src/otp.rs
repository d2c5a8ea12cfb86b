//! OTP lifecycle: issuance, verification, attempt budget, expiry.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::OsRng;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::hasher::SecretHasher;
use crate::model::{OtpPurpose, OtpRecord};
use crate::store::OtpStore;

/// Generates, stores (hashed), and verifies short numeric codes scoped by
/// purpose. This is the sole producer of plaintext codes; once a code is
/// returned for out-of-band delivery, only its hash survives.
pub struct OtpManager {
    store: Arc<dyn OtpStore>,
    hasher: Arc<dyn SecretHasher>,
    ttl_seconds: i64,
    max_attempts: u32,
}

impl OtpManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn OtpStore>,
        hasher: Arc<dyn SecretHasher>,
        ttl_seconds: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            hasher,
            ttl_seconds,
            max_attempts,
        }
    }

    /// Issue a fresh code for `(user, purpose)`, invalidating any prior
    /// records for the pair first so at most one is ever active.
    pub async fn issue(&self, user_id: Uuid, purpose: OtpPurpose) -> Result<String> {
        self.store.delete_for(user_id, purpose).await?;

        let code = generate_code();
        let code_hash = self.hasher.hash(&code)?;
        let record = OtpRecord::new(user_id, purpose, code_hash, self.ttl_seconds);
        self.store.create(&record).await?;

        debug!(user_id = %user_id, purpose = purpose.as_str(), "issued otp");
        Ok(code)
    }

    /// Verify a candidate against the newest active record.
    ///
    /// Returns the matched record on success; the caller owns its
    /// disposition (delete for verify-email, mark used for reset-password).
    pub async fn verify(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        candidate: &str,
    ) -> Result<OtpRecord> {
        let record = self
            .store
            .find_active(user_id, purpose)
            .await?
            .ok_or(AuthError::OtpExpired)?;

        // Expiry by value: a stale record the store has not collected yet
        // behaves exactly like a missing one.
        if record.is_expired() {
            return Err(AuthError::OtpExpired);
        }

        // The attempt budget is checked before comparison, so a correct
        // code after exhaustion still fails and burns the record.
        if record.attempts >= self.max_attempts {
            self.store.delete(record.id).await?;
            return Err(AuthError::OtpMaxAttempts);
        }

        if !self.hasher.compare(candidate, &record.code_hash)? {
            let mut record = record;
            record.attempts += 1;
            self.store.save(&record).await?;
            let remaining = self.max_attempts.saturating_sub(record.attempts);
            return Err(AuthError::OtpInvalid { remaining });
        }

        Ok(record)
    }

    /// Delete a successfully consumed verify-email record.
    pub async fn dispose_verified(&self, record: &OtpRecord) -> Result<()> {
        self.store.delete(record.id).await?;
        Ok(())
    }

    /// Mark a successfully consumed reset-password record as used, ending
    /// its life for verification purposes while keeping the row until TTL.
    pub async fn dispose_used(&self, mut record: OtpRecord) -> Result<()> {
        record.used = true;
        self.store.save(&record).await?;
        Ok(())
    }
}

/// Uniformly random 6-digit code from a cryptographically secure source.
///
/// `gen_range` rejection-samples internally, so the distribution over
/// `100000..=999999` carries no modulo bias.
fn generate_code() -> String {
    OsRng.gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Argon2Hasher;
    use crate::store::MemoryStore;

    fn manager(store: Arc<MemoryStore>) -> OtpManager {
        let hasher = Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap());
        OtpManager::new(store, hasher, 300, 3)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..64 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn issue_then_verify_succeeds_once() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(Arc::clone(&store));
        let user_id = Uuid::new_v4();

        let code = manager.issue(user_id, OtpPurpose::VerifyEmail).await.unwrap();
        let record = manager
            .verify(user_id, OtpPurpose::VerifyEmail, &code)
            .await
            .unwrap();
        assert_eq!(record.user_id, user_id);
        assert_eq!(record.attempts, 0);
    }

    #[tokio::test]
    async fn issue_replaces_prior_record_for_same_purpose() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(Arc::clone(&store));
        let user_id = Uuid::new_v4();

        let first = manager.issue(user_id, OtpPurpose::VerifyEmail).await.unwrap();
        let second = manager.issue(user_id, OtpPurpose::VerifyEmail).await.unwrap();

        if first != second {
            let err = manager
                .verify(user_id, OtpPurpose::VerifyEmail, &first)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::OtpInvalid { .. }));
        }
        manager
            .verify(user_id, OtpPurpose::VerifyEmail, &second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wrong_codes_burn_attempts_then_the_record() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(Arc::clone(&store));
        let user_id = Uuid::new_v4();

        let code = manager.issue(user_id, OtpPurpose::ResetPassword).await.unwrap();

        for expected_remaining in [2u32, 1, 0] {
            let err = manager
                .verify(user_id, OtpPurpose::ResetPassword, "000000")
                .await
                .unwrap_err();
            match err {
                AuthError::OtpInvalid { remaining } => {
                    assert_eq!(remaining, expected_remaining);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        // Fourth attempt fails even with the correct code, and deletes the record.
        let err = manager
            .verify(user_id, OtpPurpose::ResetPassword, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpMaxAttempts));

        let err = manager
            .verify(user_id, OtpPurpose::ResetPassword, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpExpired));
    }

    #[tokio::test]
    async fn expired_record_behaves_like_missing() {
        let store = Arc::new(MemoryStore::new());
        let hasher = Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap());
        let manager = OtpManager::new(Arc::clone(&store) as Arc<dyn crate::store::OtpStore>, hasher, 0, 3);
        let user_id = Uuid::new_v4();

        let code = manager.issue(user_id, OtpPurpose::VerifyEmail).await.unwrap();
        let err = manager
            .verify(user_id, OtpPurpose::VerifyEmail, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpExpired));
    }

    #[tokio::test]
    async fn purposes_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(Arc::clone(&store));
        let user_id = Uuid::new_v4();

        let code = manager.issue(user_id, OtpPurpose::VerifyEmail).await.unwrap();
        let err = manager
            .verify(user_id, OtpPurpose::ResetPassword, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpExpired));
    }
}
