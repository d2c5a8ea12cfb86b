//! Token issuance and the refresh-rotation protocol.
//!
//! Three token kinds, each signed with its own secret:
//!
//! - *access*: short-lived, stateless; carries the user's role and the
//!   `token_version` it was minted against.
//! - *refresh*: longer-lived; valid only while its digest is present in the
//!   user's refresh-token set. Single-use under rotation.
//! - *reset*: very short-lived, minted only after a successful
//!   reset-password OTP verification, accepted only by the password-reset
//!   operation.
//!
//! Raw refresh tokens are never persisted; the user record stores SHA-256
//! digests and membership checks digest the presented token first.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::model::{Role, User};
use crate::store::UserStore;

/// Claims carried by an access token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: Uuid,
    pub role: Role,
    /// Version counter the token was minted against; a mismatch with the
    /// live user record invalidates the token regardless of expiry.
    pub token_version: i64,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by refresh and reset tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly rotated access/refresh pair.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// SHA-256 digest of a refresh token, as stored in `User.refresh_tokens`.
#[must_use]
pub fn refresh_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Bump the per-user version counter, invalidating every outstanding access
/// token for that user at once.
pub fn bump_token_version(user: &mut User) {
    user.token_version += 1;
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl SigningKey {
    fn new(secret: &secrecy::SecretString, ttl_seconds: i64) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl_seconds,
        }
    }
}

/// Token issuance, verification, and refresh rotation.
pub struct TokenEngine {
    access: SigningKey,
    refresh: SigningKey,
    reset: SigningKey,
}

impl TokenEngine {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: SigningKey::new(config.access_secret(), config.access_ttl_seconds()),
            refresh: SigningKey::new(config.refresh_secret(), config.refresh_ttl_seconds()),
            reset: SigningKey::new(config.reset_secret(), config.reset_ttl_seconds()),
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user.id,
            role: user.role,
            token_version: user.token_version,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.access.ttl_seconds,
        };
        sign(&claims, &self.access.encoding)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String> {
        sign(
            &subject_claims(user_id, self.refresh.ttl_seconds),
            &self.refresh.encoding,
        )
    }

    pub fn issue_reset_token(&self, user_id: Uuid) -> Result<String> {
        sign(
            &subject_claims(user_id, self.reset.ttl_seconds),
            &self.reset.encoding,
        )
    }

    /// Verify signature and expiry of an access token. Expiry is reported
    /// distinctly so clients know to refresh instead of re-authenticating.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.access.decoding, &validation())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<SubjectClaims> {
        decode::<SubjectClaims>(token, &self.refresh.decoding, &validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidRefreshToken)
    }

    pub fn verify_reset_token(&self, token: &str) -> Result<SubjectClaims> {
        decode::<SubjectClaims>(token, &self.reset.decoding, &validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidResetToken)
    }

    /// Rotate a refresh token: the presented token is retired and a fresh
    /// access/refresh pair is minted.
    ///
    /// A structurally valid token whose digest is no longer in the user's
    /// set has already been rotated out (or was forged): that is treated as
    /// theft, and the whole set is wiped before the error is returned.
    pub async fn rotate_refresh(
        &self,
        users: &dyn UserStore,
        presented: Option<&str>,
    ) -> Result<TokenPair> {
        let presented = match presented {
            Some(token) if !token.trim().is_empty() => token,
            _ => return Err(AuthError::RefreshTokenMissing),
        };

        let claims = self.verify_refresh_token(presented)?;
        let user = users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }

        let access_token = self.issue_access_token(&user)?;
        let refresh_token = self.issue_refresh_token(user.id)?;

        // Conditional swap: remove old digest and append the new one only
        // if the old one is still present. Exactly one of two concurrent
        // rotations of the same token wins this swap.
        let swapped = users
            .rotate_refresh_digest(
                user.id,
                &refresh_digest(presented),
                &refresh_digest(&refresh_token),
            )
            .await?;

        if !swapped {
            warn!(user_id = %user.id, "refresh token reuse detected, revoking all sessions");
            let mut user = user;
            user.refresh_tokens.clear();
            users.save(&user).await?;
            return Err(AuthError::ReuseDetected);
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Remove one refresh token from the user's set (explicit logout).
    /// Absence of the token is not an error.
    pub fn revoke_refresh(&self, user: &mut User, token: &str) {
        user.refresh_tokens.remove(&refresh_digest(token));
    }
}

fn subject_claims(user_id: Uuid, ttl_seconds: i64) -> SubjectClaims {
    let now = Utc::now().timestamp();
    SubjectClaims {
        sub: user_id,
        jti: Uuid::new_v4(),
        iat: now,
        exp: now + ttl_seconds,
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|err| AuthError::Internal(anyhow::Error::from(err)))
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn engine() -> TokenEngine {
        TokenEngine::new(&AuthConfig::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
            SecretString::from("reset-secret".to_string()),
        ))
    }

    fn user() -> User {
        User::new_local("Ann", "a@x.com", "hash".to_string())
    }

    #[test]
    fn access_token_round_trips_claims() {
        let engine = engine();
        let user = user();
        let token = engine.issue_access_token(&user).unwrap();
        let claims = engine.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.token_version, 0);
    }

    #[test]
    fn token_kinds_do_not_cross_verify() {
        let engine = engine();
        let user = user();
        let reset = engine.issue_reset_token(user.id).unwrap();
        assert!(matches!(
            engine.verify_access_token(&reset),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            engine.verify_refresh_token(&reset),
            Err(AuthError::InvalidRefreshToken)
        ));

        let refresh = engine.issue_refresh_token(user.id).unwrap();
        assert!(matches!(
            engine.verify_reset_token(&refresh),
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let config = AuthConfig::new(
            SecretString::from("a".to_string()),
            SecretString::from("b".to_string()),
            SecretString::from("c".to_string()),
        )
        .with_access_ttl_seconds(-60);
        let engine = TokenEngine::new(&config);
        let token = engine.issue_access_token(&user()).unwrap();
        assert!(matches!(
            engine.verify_access_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn refresh_tokens_are_unique_per_issue() {
        let engine = engine();
        let user = user();
        let first = engine.issue_refresh_token(user.id).unwrap();
        let second = engine.issue_refresh_token(user.id).unwrap();
        // jti differs even when both tokens are minted in the same second.
        assert_ne!(first, second);
        assert_ne!(refresh_digest(&first), refresh_digest(&second));
    }

    #[test]
    fn revoke_refresh_is_idempotent() {
        let engine = engine();
        let mut user = user();
        let token = engine.issue_refresh_token(user.id).unwrap();
        user.refresh_tokens.insert(refresh_digest(&token));

        engine.revoke_refresh(&mut user, &token);
        assert!(user.refresh_tokens.is_empty());
        engine.revoke_refresh(&mut user, &token);
        assert!(user.refresh_tokens.is_empty());
    }

    #[test]
    fn version_bump_is_monotonic() {
        let mut user = user();
        bump_token_version(&mut user);
        bump_token_version(&mut user);
        assert_eq!(user.token_version, 2);
    }
}
