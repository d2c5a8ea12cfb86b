//! Core account and OTP records.
//!
//! `User` is the single durable identity record. Local and federated
//! accounts share the record shape but the provider is a tagged variant:
//! fields that only make sense for one variant (password hash, federated
//! subject) are enforced at construction instead of being checked ad hoc
//! at each use site.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of concurrently valid refresh tokens per user.
pub const REFRESH_TOKEN_CAPACITY: usize = 5;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Sign-in provider for an account. Immutable after creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Provider {
    /// Password account; `User.password_hash` is always present.
    Local,
    /// Federated account; carries the identity provider's subject id and
    /// never has a password hash.
    Federated { subject: String },
}

impl Provider {
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Federated { .. } => "federated",
        }
    }

    /// Federated subject identifier, if any.
    #[must_use]
    pub fn federated_subject(&self) -> Option<&str> {
        match self {
            Self::Local => None,
            Self::Federated { subject } => Some(subject),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "superadmin" => Some(Self::Superadmin),
            _ => None,
        }
    }
}

/// Fixed-capacity ordered set of refresh-token digests, oldest first.
///
/// The stored list is the source of truth for refresh-token revocation:
/// a cryptographically valid token that is not in the list is dead.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RefreshTokenSet {
    digests: Vec<String>,
}

impl RefreshTokenSet {
    #[must_use]
    pub fn from_digests(digests: Vec<String>) -> Self {
        Self { digests }
    }

    /// Append a digest, evicting the oldest entries beyond capacity.
    pub fn insert(&mut self, digest: String) {
        self.digests.push(digest);
        if self.digests.len() > REFRESH_TOKEN_CAPACITY {
            let excess = self.digests.len() - REFRESH_TOKEN_CAPACITY;
            self.digests.drain(..excess);
        }
    }

    /// Remove a digest by value. Absence is not an error.
    pub fn remove(&mut self, digest: &str) {
        self.digests.retain(|stored| stored != digest);
    }

    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.digests.iter().any(|stored| stored == digest)
    }

    /// Drop every digest, revoking all sessions at once.
    pub fn clear(&mut self) {
        self.digests.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.digests
    }
}

/// Durable account record.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Unique, lowercase, trimmed.
    pub email: String,
    /// Present only for local accounts.
    pub password_hash: Option<String>,
    pub provider: Provider,
    pub role: Role,
    pub email_verified: bool,
    /// `false` disables all authentication for this account.
    pub active: bool,
    pub refresh_tokens: RefreshTokenSet,
    /// Bumping this invalidates every outstanding access token at once.
    pub token_version: i64,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a local (password) account. Email starts unverified.
    #[must_use]
    pub fn new_local(name: &str, email: &str, password_hash: String) -> Self {
        Self::new(name, email, Some(password_hash), Provider::Local, false)
    }

    /// Create a federated account. Federation implies a pre-verified email
    /// and no password.
    #[must_use]
    pub fn new_federated(name: &str, email: &str, subject: String) -> Self {
        Self::new(name, email, None, Provider::Federated { subject }, true)
    }

    fn new(
        name: &str,
        email: &str,
        password_hash: Option<String>,
        provider: Provider,
        email_verified: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            provider,
            role: Role::User,
            email_verified,
            active: true,
            refresh_tokens: RefreshTokenSet::default(),
            token_version: 0,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while a lockout window set by failed logins is still open.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| until > Utc::now())
    }
}

/// Purpose an OTP record is scoped to. Records of different purposes never
/// satisfy each other.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OtpPurpose {
    VerifyEmail,
    ResetPassword,
}

impl OtpPurpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify-email",
            Self::ResetPassword => "reset-password",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verify-email" => Some(Self::VerifyEmail),
            "reset-password" => Some(Self::ResetPassword),
            _ => None,
        }
    }
}

/// Durable OTP record. Only the hash of the code is ever stored.
#[derive(Clone, Debug)]
pub struct OtpRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    /// Set once consumed; only meaningful for reset-password records,
    /// verify-email records are deleted on success instead.
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    #[must_use]
    pub fn new(user_id: Uuid, purpose: OtpPurpose, code_hash: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            purpose,
            code_hash,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
            attempts: 0,
            used: false,
            created_at: now,
        }
    }

    /// Expiry is checked by value: a record past its expiry behaves exactly
    /// like a missing one, even if the store has not garbage-collected it.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Account view safe for client consumption: no password hash, no
/// refresh-token digests.
#[derive(Clone, Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub provider: String,
    pub role: Role,
    pub email_verified: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            provider: user.provider.as_str().to_string(),
            role: user.role,
            email_verified: user.email_verified,
            active: user.active,
            created_at: user.created_at,
        }
    }
}
