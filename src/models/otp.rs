use chrono::Utc;
use sqlx::FromRow;

/// One-time password tied to a user. A code is valid only while it is
/// unused and its expiry lies in the future.
#[derive(Debug, Clone, FromRow)]
pub struct Otp {
    pub id: String,
    pub user_id: String,
    pub code: String,
    pub expires_at: String,
    pub used: bool,
    pub created_at: String,
}

impl Otp {
    pub fn is_expired(&self) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(exp) => exp < Utc::now(),
            // An unparseable expiry never validates
            Err(_) => true,
        }
    }
}
