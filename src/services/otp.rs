use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Otp, User};
use crate::services::email::Mailer;

/// Codes expire 10 minutes after issuance
const OTP_TTL_MINUTES: i64 = 10;

/// One-time password ledger
pub struct OtpService;

impl OtpService {
    /// Generate a 6-digit code from a uniform draw over the digit space
    pub fn generate_code() -> String {
        let n: u32 = OsRng.gen_range(0..1_000_000);
        format!("{:06}", n)
    }

    /// Issue a fresh code for the user and dispatch it by email.
    ///
    /// All previously unused codes are marked used first, so at most one
    /// valid code exists per user. The new code is persisted before the
    /// send step; a delivery failure leaves the code in storage and is
    /// surfaced to the caller as a distinct error.
    pub async fn issue(db: &Database, mailer: &dyn Mailer, user: &User) -> Result<()> {
        // Invalidation failure is logged, issuance continues
        if let Err(e) = sqlx::query("UPDATE otps SET used = 1 WHERE user_id = ? AND used = 0")
            .bind(&user.id)
            .execute(db.pool())
            .await
        {
            tracing::error!("Failed to invalidate existing OTPs: {:?}", e);
        }

        let code = Self::generate_code();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = (now + Duration::minutes(OTP_TTL_MINUTES)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO otps (id, user_id, code, expires_at, used, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.id)
        .bind(&code)
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;

        mailer.send_otp(&user.email, &user.name, &code).await?;
        Ok(())
    }

    /// Consume a code for the user.
    ///
    /// Matches the most recently created unused code; a wrong or already
    /// used code fails. An expired code fails too but stays unused, only
    /// a successful verification marks the row used.
    pub async fn verify(db: &Database, user_id: &str, code: &str) -> Result<()> {
        let otp: Otp = sqlx::query_as(
            r#"
            SELECT * FROM otps
            WHERE user_id = ? AND code = ? AND used = 0
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid verification code".to_string()))?;

        if otp.is_expired() {
            return Err(AppError::Unauthorized(
                "Verification code has expired".to_string(),
            ));
        }

        sqlx::query("UPDATE otps SET used = 1 WHERE id = ?")
            .bind(&otp.id)
            .execute(db.pool())
            .await?;

        Ok(())
    }
}
