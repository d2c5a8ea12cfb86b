//! One-way hashing for passwords and OTP codes.
//!
//! Both secrets share one contract: every plaintext that reaches a store
//! write path passes through a [`SecretHasher`] first, and comparison only
//! ever happens against the stored digest. Passwords and OTP codes use the
//! same algorithm with different cost parameters. OTP codes are short-lived
//! and attempt-bounded, so they get a cheaper profile.

use anyhow::{Context, Result, anyhow};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, Version};

/// One-way hashing with salt.
pub trait SecretHasher: Send + Sync {
    /// Hash a plaintext into a self-describing digest string.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Compare a plaintext candidate against a stored digest.
    ///
    /// A mismatch is `Ok(false)`; only an unparseable digest is an error.
    fn compare(&self, plaintext: &str, digest: &str) -> Result<bool>;
}

/// Argon2id-backed [`SecretHasher`] producing PHC-format digests.
#[derive(Clone, Debug)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Cost profile for passwords (library defaults).
    #[must_use]
    pub fn for_passwords() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Cheaper profile for 6-digit OTP codes, which expire within minutes
    /// and are bounded to 3 attempts.
    #[must_use]
    pub fn for_otp_codes() -> Self {
        // Params::new only fails on out-of-range values; these are fixed.
        let params = Params::new(8192, 1, 1, None).unwrap_or_default();
        Self { params }
    }

    /// Custom cost profile. Intended for tests and benchmark tuning.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|err| anyhow!("invalid argon2 params: {err}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash secret: {err}"))?;
        Ok(digest.to_string())
    }

    fn compare(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|err| anyhow!("malformed secret digest: {err}"))
            .context("stored digest could not be parsed")?;
        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Argon2Hasher {
        Argon2Hasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_compare_round_trips() {
        let hasher = cheap_hasher();
        let digest = hasher.hash("pw12345678").unwrap();
        assert!(hasher.compare("pw12345678", &digest).unwrap());
        assert!(!hasher.compare("wrong-password", &digest).unwrap());
    }

    #[test]
    fn digests_are_salted() {
        let hasher = cheap_hasher();
        let first = hasher.hash("482917").unwrap();
        let second = hasher.hash("482917").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_digest_is_an_error_not_a_mismatch() {
        let hasher = cheap_hasher();
        assert!(hasher.compare("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn otp_profile_is_cheaper_than_password_profile() {
        let passwords = Argon2Hasher::for_passwords();
        let codes = Argon2Hasher::for_otp_codes();
        assert!(codes.params.m_cost() < passwords.params.m_cost());
    }
}
