use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CreateLinkRequest, Link, LinkResponse, LinkStatsResponse};

/// Short link service
pub struct LinkService;

impl LinkService {
    /// Random 7-character URL-safe short code
    fn generate_short_code() -> String {
        let mut bytes = [0u8; 6];
        OsRng.fill_bytes(&mut bytes);
        let mut code = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        code.truncate(7);
        code
    }

    /// Favicon lookup through the Google favicon service
    fn favicon_url(original_url: &str) -> String {
        match url::Url::parse(original_url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => format!(
                    "https://www.google.com/s2/favicons?domain={}&sz=128",
                    host
                ),
                None => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    /// List the user's links, newest first
    pub async fn list(db: &Database, user_id: &str) -> Result<Vec<LinkResponse>> {
        let links: Vec<Link> =
            sqlx::query_as("SELECT * FROM links WHERE user_id = ? ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(db.pool())
                .await?;

        Ok(links.into_iter().map(LinkResponse::from).collect())
    }

    /// Create a link with a custom or generated short code
    pub async fn create(
        db: &Database,
        user_id: &str,
        req: CreateLinkRequest,
    ) -> Result<LinkResponse> {
        if url::Url::parse(&req.original_url).is_err() {
            return Err(AppError::BadRequest("Invalid URL".to_string()));
        }

        let short_code = if req.custom_code.trim().is_empty() {
            Self::generate_short_code()
        } else {
            req.custom_code.trim().to_string()
        };

        let existing: Option<Link> = sqlx::query_as("SELECT * FROM links WHERE short_code = ?")
            .bind(&short_code)
            .fetch_optional(db.pool())
            .await?;

        if existing.is_some() {
            return Err(AppError::Conflict("Short code already exists".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let favicon = Self::favicon_url(&req.original_url);

        let inserted = sqlx::query(
            r#"
            INSERT INTO links (id, user_id, short_code, original_url, favicon, clicks, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&short_code)
        .bind(&req.original_url)
        .bind(&favicon)
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await;

        if let Err(e) = inserted {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return Err(AppError::Conflict("Short code already exists".to_string()));
                }
            }
            return Err(e.into());
        }

        let link: Link = sqlx::query_as("SELECT * FROM links WHERE id = ?")
            .bind(&id)
            .fetch_one(db.pool())
            .await?;

        Ok(LinkResponse::from(link))
    }

    /// Delete a link owned by the user
    pub async fn delete(db: &Database, user_id: &str, link_id: &str) -> Result<()> {
        let link = Self::get_owned(db, user_id, link_id, "delete this link").await?;

        sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(&link.id)
            .execute(db.pool())
            .await?;

        Ok(())
    }

    /// Click statistics for a link owned by the user
    pub async fn stats(db: &Database, user_id: &str, link_id: &str) -> Result<LinkStatsResponse> {
        let link = Self::get_owned(db, user_id, link_id, "view this link's stats").await?;

        Ok(LinkStatsResponse {
            clicks: link.clicks,
            last_clicked: None,
        })
    }

    /// Resolve a short code, counting the click. Returns the destination URL.
    pub async fn resolve(db: &Database, short_code: &str) -> Result<String> {
        let link: Link = sqlx::query_as("SELECT * FROM links WHERE short_code = ?")
            .bind(short_code)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Link not found".to_string()))?;

        sqlx::query("UPDATE links SET clicks = clicks + 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&link.id)
            .execute(db.pool())
            .await?;

        Ok(link.original_url)
    }

    async fn get_owned(
        db: &Database,
        user_id: &str,
        link_id: &str,
        action: &str,
    ) -> Result<Link> {
        let link: Link = sqlx::query_as("SELECT * FROM links WHERE id = ?")
            .bind(link_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Link not found".to_string()))?;

        if link.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "You don't have permission to {}",
                action
            )));
        }

        Ok(link)
    }
}
