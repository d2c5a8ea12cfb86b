//! Failure taxonomy for the auth engine.
//!
//! Every operation returns either its success payload or an [`AuthError`].
//! Errors carry a fixed human-readable message (the `Display` impl), a
//! stable machine code for clients, and a coarse [`ErrorKind`] so a
//! transport layer can map them to whatever status scheme it uses. The
//! engine never retries on its own; retries (e.g. "resend OTP") are
//! caller-driven.

use thiserror::Error;

/// Coarse classification of an [`AuthError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed input (email format).
    InvalidInput,
    /// No such user, OTP, or token target.
    NotFound,
    /// Email already registered or provider mismatch.
    Conflict,
    /// Bad credentials, bad/expired token, unverified email, locked account.
    Unauthorized,
    /// OTP attempt budget exhausted.
    RateExhausted,
    /// Refresh-token replay. Signalling this error has already revoked
    /// every refresh token for the affected user.
    ReuseDetected,
    /// Collaborator failure (store, hasher, signer).
    Internal,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please provide a valid email address.")]
    InvalidEmail,

    #[error("An account with this email already exists.")]
    EmailExists,

    #[error("No account found with this email.")]
    UserNotFound,

    #[error("OTP has expired or does not exist. Please request a new one.")]
    OtpExpired,

    #[error("Too many incorrect attempts. Please request a new OTP.")]
    OtpMaxAttempts,

    #[error("Invalid OTP. {remaining} attempt(s) remaining.")]
    OtpInvalid { remaining: u32 },

    #[error("Email is already verified.")]
    EmailAlreadyVerified,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Email not verified. Please verify your email first.")]
    EmailNotVerified,

    #[error("Account is temporarily locked due to too many failed login attempts. Please try again later.")]
    AccountLocked,

    #[error("This email is registered with a different sign-in provider.")]
    ProviderMismatch,

    #[error("Refresh token is required.")]
    RefreshTokenMissing,

    #[error("Invalid or expired refresh token.")]
    InvalidRefreshToken,

    #[error("Refresh token reuse detected. All sessions have been revoked.")]
    ReuseDetected,

    #[error("Invalid or expired reset token.")]
    InvalidResetToken,

    #[error("Access token has expired. Please refresh.")]
    TokenExpired,

    #[error("Invalid access token.")]
    InvalidToken,

    #[error("Token has been invalidated. Please log in again.")]
    TokenVersionMismatch,

    #[error("Your account has been deactivated.")]
    AccountDeactivated,

    #[error("This account uses federated sign-in. Password reset is not applicable.")]
    FederatedNoPasswordReset,

    #[error("Invalid federated identity grant.")]
    FederatedExchangeFailed,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code, safe to match on across releases.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::OtpMaxAttempts => "OTP_MAX_ATTEMPTS",
            Self::OtpInvalid { .. } => "INVALID_OTP",
            Self::EmailAlreadyVerified => "EMAIL_ALREADY_VERIFIED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::ProviderMismatch => "PROVIDER_MISMATCH",
            Self::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::ReuseDetected => "TOKEN_REUSE_DETECTED",
            Self::InvalidResetToken => "INVALID_RESET_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenVersionMismatch => "TOKEN_VERSION_MISMATCH",
            Self::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            Self::FederatedNoPasswordReset => "FEDERATED_NO_PASSWORD_RESET",
            Self::FederatedExchangeFailed => "FEDERATED_EXCHANGE_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEmail => ErrorKind::InvalidInput,
            Self::UserNotFound => ErrorKind::NotFound,
            Self::EmailExists
            | Self::EmailAlreadyVerified
            | Self::ProviderMismatch
            | Self::FederatedNoPasswordReset => ErrorKind::Conflict,
            Self::OtpExpired
            | Self::OtpInvalid { .. }
            | Self::InvalidCredentials
            | Self::EmailNotVerified
            | Self::AccountLocked
            | Self::RefreshTokenMissing
            | Self::InvalidRefreshToken
            | Self::InvalidResetToken
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::TokenVersionMismatch
            | Self::AccountDeactivated
            | Self::FederatedExchangeFailed => ErrorKind::Unauthorized,
            Self::OtpMaxAttempts => ErrorKind::RateExhausted,
            Self::ReuseDetected => ErrorKind::ReuseDetected,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthError::EmailExists.code(), "EMAIL_EXISTS");
        assert_eq!(AuthError::ReuseDetected.code(), "TOKEN_REUSE_DETECTED");
        assert_eq!(AuthError::OtpInvalid { remaining: 2 }.code(), "INVALID_OTP");
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(AuthError::UserNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::ProviderMismatch.kind(), ErrorKind::Conflict);
        assert_eq!(AuthError::AccountLocked.kind(), ErrorKind::Unauthorized);
        assert_eq!(AuthError::OtpMaxAttempts.kind(), ErrorKind::RateExhausted);
        assert_eq!(AuthError::ReuseDetected.kind(), ErrorKind::ReuseDetected);
    }

    #[test]
    fn invalid_otp_reports_remaining_attempts() {
        let err = AuthError::OtpInvalid { remaining: 1 };
        assert_eq!(err.to_string(), "Invalid OTP. 1 attempt(s) remaining.");
    }
}
