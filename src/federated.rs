//! Federated sign-in: identity exchange collaborator and reconciliation.

use async_trait::async_trait;
use tracing::info;

use crate::error::{AuthError, Result};
use crate::model::{User, normalize_email};
use crate::store::{StoreError, UserStore};

/// Verified identity payload returned by the provider handshake.
#[derive(Clone, Debug)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: String,
    /// Provider-side subject identifier.
    pub subject: String,
}

/// External collaborator that exchanges an authorization artifact (e.g. an
/// OAuth authorization code) for a verified identity payload.
#[async_trait]
pub trait IdentityExchange: Send + Sync {
    async fn exchange(&self, authorization_code: &str) -> anyhow::Result<FederatedIdentity>;
}

/// Merge a federated identity with the local user set.
///
/// - no user for the email: create a pre-verified federated account;
/// - existing local (password) account: `ProviderMismatch`; a password
///   account is never silently upgraded to federated via the same email;
/// - existing federated account: returned unchanged (idempotent login).
pub async fn reconcile(users: &dyn UserStore, identity: &FederatedIdentity) -> Result<User> {
    let email = normalize_email(&identity.email);
    if let Some(user) = users.find_by_email(&email).await? {
        return reconcile_existing(user);
    }

    let user = User::new_federated(&identity.name, &email, identity.subject.clone());
    match users.create(&user).await {
        Ok(()) => {
            info!(user_id = %user.id, "created federated account");
            Ok(user)
        }
        // Lost a creation race; apply the same rules to whoever won.
        Err(StoreError::Conflict) => {
            let user = users
                .find_by_email(&email)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            reconcile_existing(user)
        }
        Err(err) => Err(err.into()),
    }
}

fn reconcile_existing(user: User) -> Result<User> {
    if user.provider.is_local() {
        return Err(AuthError::ProviderMismatch);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn identity() -> FederatedIdentity {
        FederatedIdentity {
            email: "Ann@X.com".to_string(),
            name: "Ann".to_string(),
            subject: "sub-1".to_string(),
        }
    }

    #[tokio::test]
    async fn absent_email_creates_preverified_account() {
        let store = MemoryStore::new();
        let user = reconcile(&store, &identity()).await.unwrap();
        assert_eq!(user.email, "ann@x.com");
        assert!(user.email_verified);
        assert!(user.password_hash.is_none());
        assert_eq!(user.provider.federated_subject(), Some("sub-1"));
    }

    #[tokio::test]
    async fn repeat_login_is_idempotent() {
        let store = MemoryStore::new();
        let first = reconcile(&store, &identity()).await.unwrap();
        let second = reconcile(&store, &identity()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn local_account_is_never_upgraded() {
        let store = MemoryStore::new();
        let local = User::new_local("Ann", "ann@x.com", "hash".to_string());
        UserStore::create(&store, &local).await.unwrap();

        let err = reconcile(&store, &identity()).await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderMismatch));
    }
}
