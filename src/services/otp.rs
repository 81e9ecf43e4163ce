//! One-time code gate
//!
//! A phone number must pass this gate before an account can be created for
//! it or its password reset. Codes are 6 numeric digits with a short fixed
//! expiry, single-use, and only the newest unused code is acceptable.
//! Delivery is the caller's concern; in development the generated code is
//! logged at debug level.
use crate::config::OtpSettings;
use crate::db;
use crate::error::{AuthError, Result};
use crate::validators::{is_valid_e164, is_valid_otp_shape, mask_phone};
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use tracing::{debug, info, warn};

const OTP_LENGTH: usize = 6;

/// Outcome of a code send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpSendOutcome {
    /// A fresh code was stored; lifetime in seconds
    CodeSent { expires_in: i64 },
    /// The phone already verified a code and holds no account yet; the
    /// caller should proceed straight to registration.
    AlreadyVerified,
}

#[derive(Clone)]
pub struct OtpService {
    pool: PgPool,
    ttl: Duration,
    max_verify_attempts: i32,
}

impl OtpService {
    pub fn new(pool: PgPool, settings: &OtpSettings) -> Self {
        Self {
            pool,
            ttl: Duration::seconds(settings.ttl_secs as i64),
            max_verify_attempts: settings.max_verify_attempts,
        }
    }

    /// Issue a fresh code for a phone number, invalidating earlier unused
    /// codes so only the newest is acceptable.
    pub async fn send(&self, phone: &str) -> Result<OtpSendOutcome> {
        if !is_valid_e164(phone) {
            return Err(AuthError::Validation(
                "Phone number must be in E.164 format (e.g. +14155551234)".to_string(),
            ));
        }

        let account = db::accounts::find_by_phone(&self.pool, phone).await?;
        if account.is_none() && db::otp_codes::has_verified(&self.pool, phone).await? {
            info!(
                phone = %mask_phone(phone),
                "Phone already verified and unclaimed, skipping code"
            );
            return Ok(OtpSendOutcome::AlreadyVerified);
        }

        db::otp_codes::invalidate_unused(&self.pool, phone).await?;

        let code = generate_code();
        let expires_at = Utc::now() + self.ttl;
        db::otp_codes::create(&self.pool, phone, &code, expires_at).await?;

        info!(phone = %mask_phone(phone), "Verification code issued");
        debug!(
            phone = %mask_phone(phone),
            code = %code,
            "Code logged for development, delivery is the caller's concern"
        );

        Ok(OtpSendOutcome::CodeSent {
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Verify a submitted code against the newest unused record.
    ///
    /// Single-use: success flips the record to used, so replaying the same
    /// code fails. Each mismatch counts against the code; past
    /// `max_verify_attempts` the code is burned.
    pub async fn verify(&self, phone: &str, code: &str) -> Result<()> {
        if !is_valid_e164(phone) {
            return Err(AuthError::Validation(
                "Phone number must be in E.164 format".to_string(),
            ));
        }
        if !is_valid_otp_shape(code) {
            return Err(AuthError::Validation(
                "Verification code must be 6 digits".to_string(),
            ));
        }

        let record = match db::otp_codes::latest_unused(&self.pool, phone).await? {
            Some(record) => record,
            None => {
                // Distinguish "retry" from "this phone is already done"
                if db::otp_codes::has_verified(&self.pool, phone).await? {
                    return Err(AuthError::OtpAlreadyVerified);
                }
                return Err(AuthError::OtpInvalidCode);
            }
        };

        if record.is_expired() {
            return Err(AuthError::OtpExpired);
        }

        if record.attempts >= self.max_verify_attempts {
            warn!(
                phone = %mask_phone(phone),
                attempts = record.attempts,
                "Verification code burned by repeated failures"
            );
            return Err(AuthError::OtpInvalidCode);
        }

        if record.code != code {
            db::otp_codes::increment_attempts(&self.pool, record.id).await?;
            warn!(phone = %mask_phone(phone), "Invalid verification code attempt");
            return Err(AuthError::OtpInvalidCode);
        }

        // Conditional flip: a concurrent verify of the same code loses here
        if !db::otp_codes::mark_used(&self.pool, record.id).await? {
            return Err(AuthError::OtpInvalidCode);
        }

        info!(phone = %mask_phone(phone), "Phone verified");
        Ok(())
    }

    /// Whether the phone has completed verification. Registration re-checks
    /// this at account-creation time.
    pub async fn is_phone_verified(&self, phone: &str) -> Result<bool> {
        db::otp_codes::has_verified(&self.pool, phone).await
    }
}

/// Generate a random numeric code
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_LENGTH)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_shape() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
