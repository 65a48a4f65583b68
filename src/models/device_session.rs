use chrono::Utc;
use sqlx::FromRow;

/// Device trust record: this device completed 2FA recently and may skip
/// it until the session expires. The device token is unique across all
/// sessions.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceSession {
    pub id: String,
    pub user_id: String,
    pub device_token: String,
    pub expires_at: String,
    pub created_at: String,
}

impl DeviceSession {
    pub fn is_valid(&self) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(exp) => exp > Utc::now(),
            Err(_) => false,
        }
    }
}
