//! The auth orchestrator: composes credentials, OTP, tokens, and
//! reconciliation into the user-facing flows.
//!
//! Every operation returns either its success payload or a typed
//! [`AuthError`] that the transport layer passes through unchanged. The
//! engine holds no mutable state of its own; everything durable lives
//! behind the store traits.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::credentials::{record_failed_attempt, record_success, verify_password};
use crate::error::{AuthError, Result};
use crate::federated::{IdentityExchange, reconcile};
use crate::hasher::{Argon2Hasher, SecretHasher};
use crate::model::{OtpPurpose, User, UserView, normalize_email, valid_email};
use crate::notify::OtpNotifier;
use crate::otp::OtpManager;
use crate::store::{OtpStore, StoreError, UserStore};
use crate::token::{TokenEngine, TokenPair, bump_token_version, refresh_digest};

/// Tokens and sanitized account data returned by a successful login.
#[derive(Clone, Debug)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
}

/// Authentication and session-lifecycle engine.
pub struct AuthEngine {
    users: Arc<dyn UserStore>,
    otps: OtpManager,
    tokens: TokenEngine,
    password_hasher: Arc<dyn SecretHasher>,
    notifier: Arc<dyn OtpNotifier>,
    exchange: Arc<dyn IdentityExchange>,
    config: AuthConfig,
}

impl AuthEngine {
    /// Build an engine with the default Argon2id hashers.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        otp_store: Arc<dyn OtpStore>,
        exchange: Arc<dyn IdentityExchange>,
        notifier: Arc<dyn OtpNotifier>,
        config: AuthConfig,
    ) -> Self {
        Self::with_hashers(
            users,
            otp_store,
            exchange,
            notifier,
            config,
            Arc::new(Argon2Hasher::for_passwords()),
            Arc::new(Argon2Hasher::for_otp_codes()),
        )
    }

    /// Build an engine with caller-provided hashers (cost tuning, tests).
    #[must_use]
    pub fn with_hashers(
        users: Arc<dyn UserStore>,
        otp_store: Arc<dyn OtpStore>,
        exchange: Arc<dyn IdentityExchange>,
        notifier: Arc<dyn OtpNotifier>,
        config: AuthConfig,
        password_hasher: Arc<dyn SecretHasher>,
        otp_hasher: Arc<dyn SecretHasher>,
    ) -> Self {
        let otps = OtpManager::new(
            otp_store,
            otp_hasher,
            config.otp_ttl_seconds(),
            config.otp_max_attempts(),
        );
        let tokens = TokenEngine::new(&config);
        Self {
            users,
            otps,
            tokens,
            password_hasher,
            notifier,
            exchange,
            config,
        }
    }

    /// Register a local account and send a verify-email OTP.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }

        let password_hash = self.password_hasher.hash(password)?;
        let user = User::new_local(name, &email, password_hash);
        match self.users.create(&user).await {
            Ok(()) => {}
            // Creation race on the unique email constraint.
            Err(StoreError::Conflict) => return Err(AuthError::EmailExists),
            Err(err) => return Err(err.into()),
        }

        info!(user_id = %user.id, "registered local account");
        self.issue_and_send(&user, OtpPurpose::VerifyEmail).await
    }

    /// Consume a verify-email OTP and mark the email verified.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<()> {
        let mut user = self.user_by_email(email).await?;
        let record = self
            .otps
            .verify(user.id, OtpPurpose::VerifyEmail, code)
            .await?;

        user.email_verified = true;
        self.users.save(&user).await?;
        // Verify-email records are single-shot: gone on success.
        self.otps.dispose_verified(&record).await?;

        info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// Re-issue the verify-email OTP for a not-yet-verified account.
    pub async fn resend_otp(&self, email: &str) -> Result<()> {
        let user = self.user_by_email(email).await?;
        if user.email_verified {
            return Err(AuthError::EmailAlreadyVerified);
        }
        self.issue_and_send(&user, OtpPurpose::VerifyEmail).await
    }

    /// Password login.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens> {
        let email = normalize_email(email);
        let Some(mut user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        // Provider separation is symmetric: a federated account never
        // authenticates by password, even if a hash were somehow present.
        if !user.provider.is_local() {
            return Err(AuthError::ProviderMismatch);
        }
        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }
        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        // While the lock window is open, credential correctness is irrelevant.
        if user.is_locked() {
            return Err(AuthError::AccountLocked);
        }

        if !verify_password(self.password_hasher.as_ref(), &user, password)? {
            record_failed_attempt(
                &mut user,
                self.config.max_failed_logins(),
                self.config.lockout_seconds(),
            );
            self.users.save(&user).await?;
            return Err(AuthError::InvalidCredentials);
        }

        record_success(&mut user);
        info!(user_id = %user.id, "password login");
        self.issue_session(user).await
    }

    /// Federated login: exchange the authorization artifact, reconcile the
    /// identity, and open a session.
    pub async fn federated_login(&self, authorization_code: &str) -> Result<SessionTokens> {
        let identity = match self.exchange.exchange(authorization_code).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!("federated identity exchange failed: {err:#}");
                return Err(AuthError::FederatedExchangeFailed);
            }
        };

        let user = reconcile(self.users.as_ref(), &identity).await?;
        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }

        info!(user_id = %user.id, "federated login");
        self.issue_session(user).await
    }

    /// Rotate a refresh token into a fresh access/refresh pair.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair> {
        self.tokens
            .rotate_refresh(self.users.as_ref(), presented)
            .await
    }

    /// Revoke one refresh token. Idempotent: revoking an already-absent
    /// token succeeds.
    pub async fn logout(&self, user_id: Uuid, refresh_token: Option<&str>) -> Result<()> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(token) = refresh_token {
            self.tokens.revoke_refresh(&mut user, token);
            self.users.save(&user).await?;
        }
        Ok(())
    }

    /// Start the password-reset flow.
    ///
    /// Unknown emails succeed silently so the operation cannot be used to
    /// enumerate accounts.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };
        if !user.provider.is_local() {
            return Err(AuthError::FederatedNoPasswordReset);
        }
        self.issue_and_send(&user, OtpPurpose::ResetPassword).await
    }

    /// Verify a reset-password OTP and exchange it for a reset token.
    pub async fn verify_reset_otp(&self, email: &str, code: &str) -> Result<String> {
        let user = self.user_by_email(email).await?;
        let record = self
            .otps
            .verify(user.id, OtpPurpose::ResetPassword, code)
            .await?;

        // Reset records are marked used rather than deleted; the reset
        // token minted below is what authorizes the actual change.
        self.otps.dispose_used(record).await?;
        self.tokens.issue_reset_token(user.id)
    }

    /// Set a new password under a valid reset token. Revokes every session:
    /// all refresh tokens are dropped and the token version is bumped.
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<()> {
        let claims = self.tokens.verify_reset_token(reset_token)?;
        let mut user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }

        user.password_hash = Some(self.password_hasher.hash(new_password)?);
        user.refresh_tokens.clear();
        bump_token_version(&mut user);
        record_success(&mut user);
        self.users.save(&user).await?;

        info!(user_id = %user.id, "password reset, all sessions revoked");
        Ok(())
    }

    /// Authenticate an access token and return the account it belongs to.
    ///
    /// Beyond signature and expiry this checks the live record: the account
    /// must still exist, be active, and carry the token's version.
    pub async fn current_user(&self, access_token: &str) -> Result<UserView> {
        let claims = self.tokens.verify_access_token(access_token)?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.active {
            return Err(AuthError::AccountDeactivated);
        }
        if claims.token_version != user.token_version {
            return Err(AuthError::TokenVersionMismatch);
        }
        Ok(UserView::from(&user))
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        let email = normalize_email(email);
        self.users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Mint an access/refresh pair for a user and persist the new digest.
    async fn issue_session(&self, mut user: User) -> Result<SessionTokens> {
        let access_token = self.tokens.issue_access_token(&user)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;
        user.refresh_tokens.insert(refresh_digest(&refresh_token));
        self.users.save(&user).await?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            user: UserView::from(&user),
        })
    }

    /// Issue an OTP and hand it to the notifier. Delivery failure is a soft
    /// failure: the record is already persisted and resend can recover.
    async fn issue_and_send(&self, user: &User, purpose: OtpPurpose) -> Result<()> {
        let code = self.otps.issue(user.id, purpose).await?;
        if let Err(err) = self.notifier.send_otp(&user.email, &code, purpose).await {
            warn!(
                user_id = %user.id,
                purpose = purpose.as_str(),
                "otp delivery failed: {err:#}"
            );
        }
        Ok(())
    }
}
