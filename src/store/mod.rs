//! Durable-store collaborator contracts.
//!
//! The engine owns no persistence; it talks to whatever implements these
//! traits. The store must enforce email uniqueness on user creation and is
//! allowed (but not required) to garbage-collect expired OTP records;
//! expiry is always re-checked by value in the OTP manager.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{OtpPurpose, OtpRecord, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation (duplicate email).
    #[error("unique constraint violation")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for crate::error::AuthError {
    /// Store failures that reach the engine unhandled are internal errors;
    /// the engine matches [`StoreError::Conflict`] explicitly where it has
    /// domain meaning (duplicate email on registration).
    fn from(err: StoreError) -> Self {
        Self::Internal(err.into())
    }
}

/// User-record persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Insert a new record; fails with [`StoreError::Conflict`] when the
    /// email is already taken.
    async fn create(&self, user: &User) -> StoreResult<()>;

    /// Persist the mutated fields of an existing record (read-modify-write).
    async fn save(&self, user: &User) -> StoreResult<()>;

    /// Atomic refresh rotation primitive: remove `old_digest` and append
    /// `new_digest` in one conditional update, only if `old_digest` is
    /// currently present. Returns whether the swap was applied.
    ///
    /// Two concurrent rotations of the same token must observe exactly one
    /// `true`; the loser's `false` is what the engine treats as reuse.
    async fn rotate_refresh_digest(
        &self,
        user_id: Uuid,
        old_digest: &str,
        new_digest: &str,
    ) -> StoreResult<bool>;
}

/// OTP-record persistence.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn create(&self, record: &OtpRecord) -> StoreResult<()>;

    /// Newest unused record for `(user, purpose)`, regardless of expiry.
    /// The caller decides what expiry means; see [`OtpRecord::is_expired`].
    async fn find_active(&self, user_id: Uuid, purpose: OtpPurpose)
        -> StoreResult<Option<OtpRecord>>;

    async fn save(&self, record: &OtpRecord) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Delete every record for `(user, purpose)`; used to guarantee at most
    /// one active OTP per pair before issuing a new one.
    async fn delete_for(&self, user_id: Uuid, purpose: OtpPurpose) -> StoreResult<()>;
}
