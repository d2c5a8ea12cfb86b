//! Engine configuration: token lifetimes, signing secrets, and policy knobs.

use secrecy::SecretString;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_FAILED_LOGINS: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 30 * 60;

/// Engine configuration.
///
/// Each token kind signs with its own secret so a reset token can never be
/// replayed as an access or refresh token.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    reset_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    otp_max_attempts: u32,
    max_failed_logins: u32,
    lockout_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        reset_secret: SecretString,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            reset_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: u32) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_max_failed_logins(mut self, attempts: u32) -> Self {
        self.max_failed_logins = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    #[must_use]
    pub fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    #[must_use]
    pub fn reset_secret(&self) -> &SecretString {
        &self.reset_secret
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn reset_ttl_seconds(&self) -> i64 {
        self.reset_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_max_attempts(&self) -> u32 {
        self.otp_max_attempts
    }

    #[must_use]
    pub fn max_failed_logins(&self) -> u32 {
        self.max_failed_logins
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("access".to_string()),
            SecretString::from("refresh".to_string()),
            SecretString::from("reset".to_string()),
        )
    }

    #[test]
    fn defaults_match_policy() {
        let config = config();
        assert_eq!(config.access_ttl_seconds(), 15 * 60);
        assert_eq!(config.refresh_ttl_seconds(), 7 * 24 * 60 * 60);
        assert_eq!(config.reset_ttl_seconds(), 10 * 60);
        assert_eq!(config.otp_ttl_seconds(), 5 * 60);
        assert_eq!(config.otp_max_attempts(), 3);
        assert_eq!(config.max_failed_logins(), 5);
        assert_eq!(config.lockout_seconds(), 30 * 60);
    }

    #[test]
    fn builders_override_defaults() {
        let config = config()
            .with_access_ttl_seconds(60)
            .with_otp_max_attempts(5)
            .with_lockout_seconds(10);
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.otp_max_attempts(), 5);
        assert_eq!(config.lockout_seconds(), 10);
    }
}
