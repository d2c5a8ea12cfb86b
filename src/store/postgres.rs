//! Postgres-backed store.
//!
//! Schema lives in `sql/schema.sql`. Refresh rotation uses a single
//! conditional `UPDATE` so concurrent rotations of the same token resolve
//! inside the database; everything else is plain read-modify-write.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::model::{OtpPurpose, OtpRecord, Provider, RefreshTokenSet, Role, User};

use super::{OtpStore, StoreError, StoreResult, UserStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let provider = match row.try_get::<&str, _>("provider")? {
        "local" => Provider::Local,
        "federated" => Provider::Federated {
            subject: row
                .try_get::<Option<String>, _>("federated_subject")?
                .ok_or_else(|| anyhow!("federated user row without subject"))?,
        },
        other => return Err(anyhow!("unknown provider: {other}")),
    };
    let role = row.try_get::<&str, _>("role")?;
    let role = Role::parse(role).ok_or_else(|| anyhow!("unknown role: {role}"))?;
    let attempts: i32 = row.try_get("failed_login_attempts")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        provider,
        role,
        email_verified: row.try_get("email_verified")?,
        active: row.try_get("active")?,
        refresh_tokens: RefreshTokenSet::from_digests(row.try_get("refresh_tokens")?),
        token_version: row.try_get("token_version")?,
        failed_login_attempts: u32::try_from(attempts).context("negative attempt counter")?,
        locked_until: row.try_get::<Option<DateTime<Utc>>, _>("locked_until")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn otp_from_row(row: &PgRow) -> Result<OtpRecord> {
    let purpose = row.try_get::<&str, _>("purpose")?;
    let purpose =
        OtpPurpose::parse(purpose).ok_or_else(|| anyhow!("unknown otp purpose: {purpose}"))?;
    let attempts: i32 = row.try_get("attempts")?;

    Ok(OtpRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        purpose,
        code_hash: row.try_get("code_hash")?,
        expires_at: row.try_get("expires_at")?,
        attempts: u32::try_from(attempts).context("negative attempt counter")?,
        used: row.try_get("used")?,
        created_at: row.try_get("created_at")?,
    })
}

const USER_COLUMNS: &str = "id, name, email, password_hash, provider, federated_subject, role, \
     email_verified, active, refresh_tokens, token_version, failed_login_attempts, \
     locked_until, created_at, updated_at";

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose().map_err(Into::into)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose().map_err(Into::into)
    }

    async fn create(&self, user: &User) -> StoreResult<()> {
        let query = r"
            INSERT INTO users
                (id, name, email, password_hash, provider, federated_subject, role,
                 email_verified, active, refresh_tokens, token_version,
                 failed_login_attempts, locked_until, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ";
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.provider.as_str())
            .bind(user.provider.federated_subject())
            .bind(user.role.as_str())
            .bind(user.email_verified)
            .bind(user.active)
            .bind(user.refresh_tokens.as_slice())
            .bind(user.token_version)
            .bind(i32::try_from(user.failed_login_attempts).unwrap_or(i32::MAX))
            .bind(user.locked_until)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::from(err).context("failed to insert user"),
            )),
        }
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let query = r"
            UPDATE users
            SET name = $2,
                password_hash = $3,
                role = $4,
                email_verified = $5,
                active = $6,
                refresh_tokens = $7,
                token_version = $8,
                failed_login_attempts = $9,
                locked_until = $10,
                updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.email_verified)
            .bind(user.active)
            .bind(user.refresh_tokens.as_slice())
            .bind(user.token_version)
            .bind(i32::try_from(user.failed_login_attempts).unwrap_or(i32::MAX))
            .bind(user.locked_until)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to save user")?;
        Ok(())
    }

    async fn rotate_refresh_digest(
        &self,
        user_id: Uuid,
        old_digest: &str,
        new_digest: &str,
    ) -> StoreResult<bool> {
        // The WHERE clause makes the swap conditional on the old digest
        // still being present; of two concurrent rotations exactly one
        // matches a row.
        let query = r"
            UPDATE users
            SET refresh_tokens = array_append(array_remove(refresh_tokens, $2), $3),
                updated_at = NOW()
            WHERE id = $1
              AND $2 = ANY(refresh_tokens)
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(old_digest)
            .bind(new_digest)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to rotate refresh digest")?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OtpStore for PostgresStore {
    async fn create(&self, record: &OtpRecord) -> StoreResult<()> {
        let query = r"
            INSERT INTO otp_codes
                (id, user_id, purpose, code_hash, expires_at, attempts, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(record.user_id)
            .bind(record.purpose.as_str())
            .bind(&record.code_hash)
            .bind(record.expires_at)
            .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
            .bind(record.used)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert otp record")?;
        Ok(())
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> StoreResult<Option<OtpRecord>> {
        // Expiry is deliberately not filtered here; the manager checks it
        // by value so stale rows behave exactly like missing ones.
        let query = r"
            SELECT id, user_id, purpose, code_hash, expires_at, attempts, used, created_at
            FROM otp_codes
            WHERE user_id = $1
              AND purpose = $2
              AND used = FALSE
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup otp record")?;
        row.as_ref().map(otp_from_row).transpose().map_err(Into::into)
    }

    async fn save(&self, record: &OtpRecord) -> StoreResult<()> {
        let query = r"
            UPDATE otp_codes
            SET attempts = $2,
                used = $3
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
            .bind(record.used)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to save otp record")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let query = "DELETE FROM otp_codes WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete otp record")?;
        Ok(())
    }

    async fn delete_for(&self, user_id: Uuid, purpose: OtpPurpose) -> StoreResult<()> {
        let query = "DELETE FROM otp_codes WHERE user_id = $1 AND purpose = $2";
        sqlx::query(query)
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete otp records")?;
        Ok(())
    }
}
