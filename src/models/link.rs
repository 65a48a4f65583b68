use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Short link model
#[derive(Debug, Clone, FromRow)]
pub struct Link {
    pub id: String,
    pub user_id: String,
    pub short_code: String,
    pub original_url: String,
    pub favicon: String,
    pub clicks: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Request to create a link
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub original_url: String,
    #[serde(default)]
    pub custom_code: String,
}

/// Link response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub id: String,
    pub short_code: String,
    pub original_url: String,
    pub clicks: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub favicon: String,
    pub user_id: String,
    pub created_at: String,
}

impl From<Link> for LinkResponse {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            short_code: link.short_code,
            original_url: link.original_url,
            clicks: link.clicks,
            favicon: link.favicon,
            user_id: link.user_id,
            created_at: link.created_at,
        }
    }
}

/// Click statistics for a link
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatsResponse {
    pub clicks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_clicked: Option<String>,
}
