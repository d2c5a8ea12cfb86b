//! Out-of-band OTP delivery abstraction.
//!
//! Delivery is fire-and-forget from the engine's perspective: issuance has
//! already persisted the hashed record, and a delivery failure surfaces as
//! a logged warning, not a failure of the issuing flow. Resend exists to
//! recover from lost mail.

use async_trait::async_trait;
use tracing::info;

use crate::model::OtpPurpose;

/// Delivers a plaintext OTP code to its owner.
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    /// Deliver a code or return an error; the engine logs errors and moves on.
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> anyhow::Result<()>;
}

/// Local dev notifier that logs instead of sending real email.
///
/// The log line carries the code: for this sender, the log *is* the
/// delivery channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> anyhow::Result<()> {
        info!(
            email = %email,
            code = %code,
            purpose = purpose.as_str(),
            "otp delivery stub"
        );
        Ok(())
    }
}
