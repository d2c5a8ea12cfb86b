//! In-memory store for tests and local development.
//!
//! Every operation takes one lock, so the conditional rotation primitive is
//! atomic here too. User read-modify-write (`save`) keeps last-writer-wins
//! semantics on purpose; the behavioral suite covers the rotation race
//! through `rotate_refresh_digest`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{OtpPurpose, OtpRecord, User};

use super::{OtpStore, StoreError, StoreResult, UserStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    otps: Mutex<Vec<OtpRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.lock().await;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn rotate_refresh_digest(
        &self,
        user_id: Uuid,
        old_digest: &str,
        new_digest: &str,
    ) -> StoreResult<bool> {
        let mut users = self.users.lock().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        if !user.refresh_tokens.contains(old_digest) {
            return Ok(false);
        }
        user.refresh_tokens.remove(old_digest);
        user.refresh_tokens.insert(new_digest.to_string());
        Ok(true)
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn create(&self, record: &OtpRecord) -> StoreResult<()> {
        let mut otps = self.otps.lock().await;
        otps.push(record.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> StoreResult<Option<OtpRecord>> {
        let otps = self.otps.lock().await;
        Ok(otps
            .iter()
            .filter(|record| {
                record.user_id == user_id && record.purpose == purpose && !record.used
            })
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn save(&self, record: &OtpRecord) -> StoreResult<()> {
        let mut otps = self.otps.lock().await;
        if let Some(stored) = otps.iter_mut().find(|stored| stored.id == record.id) {
            *stored = record.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut otps = self.otps.lock().await;
        otps.retain(|record| record.id != id);
        Ok(())
    }

    async fn delete_for(&self, user_id: Uuid, purpose: OtpPurpose) -> StoreResult<()> {
        let mut otps = self.otps.lock().await;
        otps.retain(|record| !(record.user_id == user_id && record.purpose == purpose));
        Ok(())
    }
}
