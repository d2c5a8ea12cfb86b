//! # Varco (Authentication & Session-Lifecycle Engine)
//!
//! `varco` owns credential verification and lockout policy, one-time-passcode
//! (OTP) issuance and verification for email ownership and password-reset
//! flows, and the issuance/rotation/invalidation protocol for access,
//! refresh, and reset tokens, including refresh-token replay detection.
//!
//! ## Accounts
//!
//! The email is the identity key (unique, lowercase). An account is either
//! `local` (password) or `federated` (external identity provider); the
//! provider is immutable and the two never merge silently; cross-provider
//! authentication fails with a provider-mismatch conflict in both
//! directions.
//!
//! ## Sessions
//!
//! - **Access tokens** are short-lived and stateless, but carry the user's
//!   `token_version`; bumping the version (on password reset) invalidates
//!   every outstanding access token instantly.
//! - **Refresh tokens** are single-use: rotation retires the presented
//!   token and mints a fresh pair. A second presentation of a retired token
//!   is treated as theft and revokes every session for that user. At most
//!   five refresh tokens are valid per user; the oldest is evicted first.
//! - **Reset tokens** are minted only after a reset-password OTP check and
//!   are accepted only by the password-reset operation.
//!
//! ## Collaborators
//!
//! Persistence ([`store::UserStore`]/[`store::OtpStore`]), OTP delivery
//! ([`notify::OtpNotifier`]), and the identity-provider handshake
//! ([`federated::IdentityExchange`]) are trait collaborators; the crate
//! ships a Postgres store, an in-memory store, and a logging notifier.
//! HTTP transport, request validation, and rate limiting belong to the
//! caller.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod federated;
pub mod hasher;
pub mod model;
pub mod notify;
pub mod otp;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use engine::{AuthEngine, SessionTokens};
pub use error::{AuthError, ErrorKind};
pub use model::{Provider, Role, User, UserView};
pub use token::TokenPair;
