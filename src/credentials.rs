//! Password verification and account lockout bookkeeping.
//!
//! Lockout is account-scoped and composes with the OTP attempt budget; the
//! lock duration is fixed, not exponential. Callers persist the mutated
//! user record after `record_failed_attempt`/`record_success`.

use chrono::{Duration, Utc};
use tracing::info;

use crate::error::Result;
use crate::hasher::SecretHasher;
use crate::model::User;

/// Compare a candidate password against the stored hash.
///
/// Accounts without a password hash (federated-only) never match.
pub fn verify_password(hasher: &dyn SecretHasher, user: &User, candidate: &str) -> Result<bool> {
    match &user.password_hash {
        Some(digest) => Ok(hasher.compare(candidate, digest)?),
        None => Ok(false),
    }
}

/// Count a failed login; reaching the threshold opens the lockout window.
pub fn record_failed_attempt(user: &mut User, max_attempts: u32, lockout_seconds: i64) {
    user.failed_login_attempts += 1;
    if user.failed_login_attempts >= max_attempts {
        user.locked_until = Some(Utc::now() + Duration::seconds(lockout_seconds));
        info!(user_id = %user.id, "account locked after repeated failed logins");
    }
}

/// Reset the failure counter and clear any lock after a successful login.
pub fn record_success(user: &mut User) {
    user.failed_login_attempts = 0;
    user.locked_until = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Argon2Hasher;

    fn local_user(hasher: &Argon2Hasher) -> User {
        let digest = hasher.hash("pw12345678").unwrap();
        User::new_local("Ann", "a@x.com", digest)
    }

    #[test]
    fn correct_password_matches() {
        let hasher = Argon2Hasher::with_params(8, 1, 1).unwrap();
        let user = local_user(&hasher);
        assert!(verify_password(&hasher, &user, "pw12345678").unwrap());
        assert!(!verify_password(&hasher, &user, "other").unwrap());
    }

    #[test]
    fn passwordless_account_never_matches() {
        let hasher = Argon2Hasher::with_params(8, 1, 1).unwrap();
        let user = User::new_federated("Ann", "a@x.com", "sub".to_string());
        assert!(!verify_password(&hasher, &user, "pw12345678").unwrap());
    }

    #[test]
    fn threshold_opens_the_lock() {
        let mut user = User::new_local("Ann", "a@x.com", "hash".to_string());
        for _ in 0..4 {
            record_failed_attempt(&mut user, 5, 30 * 60);
            assert!(!user.is_locked());
        }
        record_failed_attempt(&mut user, 5, 30 * 60);
        assert!(user.is_locked());
        assert_eq!(user.failed_login_attempts, 5);
    }

    #[test]
    fn success_clears_counter_and_lock() {
        let mut user = User::new_local("Ann", "a@x.com", "hash".to_string());
        for _ in 0..5 {
            record_failed_attempt(&mut user, 5, 30 * 60);
        }
        record_success(&mut user);
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
    }

    #[test]
    fn expired_lock_window_reopens_the_account() {
        let mut user = User::new_local("Ann", "a@x.com", "hash".to_string());
        for _ in 0..5 {
            record_failed_attempt(&mut user, 5, 0);
        }
        // Zero-length window: the lock timestamp is already in the past.
        assert!(!user.is_locked());
    }
}
