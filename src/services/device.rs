use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::DeviceSession;

/// Device trust lasts one week after a completed 2FA
const DEVICE_SESSION_TTL_DAYS: i64 = 7;

/// Device trust ledger
pub struct DeviceService;

impl DeviceService {
    /// Generate a device token: 32 random bytes, hex-encoded
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Whether this device already completed 2FA for the user recently
    pub async fn is_trusted(db: &Database, user_id: &str, device_token: &str) -> Result<bool> {
        if device_token.is_empty() {
            return Ok(false);
        }

        let session: Option<DeviceSession> = sqlx::query_as(
            "SELECT * FROM device_sessions WHERE user_id = ? AND device_token = ?",
        )
        .bind(user_id)
        .bind(device_token)
        .fetch_optional(db.pool())
        .await?;

        Ok(session.map(|s| s.is_valid()).unwrap_or(false))
    }

    /// Record a completed 2FA for this device.
    ///
    /// The device token is globally unique: any prior session holding it,
    /// whatever its owner, is deleted before the insert.
    pub async fn create_session(db: &Database, user_id: &str, device_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM device_sessions WHERE device_token = ?")
            .bind(device_token)
            .execute(db.pool())
            .await?;

        let now = Utc::now();
        let expires_at = (now + Duration::days(DEVICE_SESSION_TTL_DAYS)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO device_sessions (id, user_id, device_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(device_token)
        .bind(&expires_at)
        .bind(now.to_rfc3339())
        .execute(db.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_user(db: &Database, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, created_at, updated_at)
            VALUES (?, ?, 'Tester', 'hash', 'user', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await
        .unwrap();
        id
    }

    async fn insert_session(db: &Database, user_id: &str, token: &str, expires_at: &str) {
        sqlx::query(
            r#"
            INSERT INTO device_sessions (id, user_id, device_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(Utc::now().to_rfc3339())
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = DeviceService::generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn empty_token_is_never_trusted() {
        let db = Database::new_in_memory().await.unwrap();
        assert!(!DeviceService::is_trusted(&db, "u1", "").await.unwrap());
    }

    #[tokio::test]
    async fn fresh_session_grants_trust_until_expiry() {
        let db = Database::new_in_memory().await.unwrap();
        let user = setup_user(&db, "u@example.com").await;
        let other = setup_user(&db, "v@example.com").await;

        DeviceService::create_session(&db, &user, "tok-1").await.unwrap();

        assert!(DeviceService::is_trusted(&db, &user, "tok-1").await.unwrap());
        // Other user, same token: not trusted
        assert!(!DeviceService::is_trusted(&db, &other, "tok-1").await.unwrap());
        // Unknown token
        assert!(!DeviceService::is_trusted(&db, &user, "tok-x").await.unwrap());
    }

    #[tokio::test]
    async fn expiry_boundary_is_enforced() {
        let db = Database::new_in_memory().await.unwrap();
        let user = setup_user(&db, "u@example.com").await;

        let just_valid = (Utc::now() + Duration::seconds(30)).to_rfc3339();
        insert_session(&db, &user, "tok-valid", &just_valid).await;
        assert!(DeviceService::is_trusted(&db, &user, "tok-valid").await.unwrap());

        let just_expired = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        insert_session(&db, &user, "tok-expired", &just_expired).await;
        assert!(!DeviceService::is_trusted(&db, &user, "tok-expired").await.unwrap());
    }

    #[tokio::test]
    async fn recreating_a_session_replaces_the_old_one() {
        let db = Database::new_in_memory().await.unwrap();
        let user = setup_user(&db, "u@example.com").await;
        let other = setup_user(&db, "v@example.com").await;

        DeviceService::create_session(&db, &user, "tok-1").await.unwrap();
        DeviceService::create_session(&db, &other, "tok-1").await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM device_sessions WHERE device_token = ?")
                .bind("tok-1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);

        // The token moved to the second user
        assert!(!DeviceService::is_trusted(&db, &user, "tok-1").await.unwrap());
        assert!(DeviceService::is_trusted(&db, &other, "tok-1").await.unwrap());
    }
}
