use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    AuthResponse, Claims, CreateUserRequest, LoginOutcome, LoginRequest, TwoFactorRequired, User,
    UserRole, Verify2faRequest,
};
use crate::services::{DeviceService, Mailer, OtpService};

/// Authentication orchestrator: password checks, device trust, OTP
/// issuance and session minting.
pub struct AuthService;

impl AuthService {
    /// Register a new user. Signup always requires 2FA: the response
    /// carries no token, a verification code is emailed instead.
    pub async fn signup(
        db: &Database,
        mailer: &dyn Mailer,
        req: CreateUserRequest,
    ) -> Result<TwoFactorRequired> {
        if !req.email.contains('@') {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }
        if req.password.len() < 6 {
            return Err(AppError::BadRequest(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        if req.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }

        // Emails are stored normalized to lowercase
        let email = req.email.trim().to_lowercase();

        let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(db.pool())
            .await?;

        if existing.is_some() {
            return Err(AppError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }

        let password_hash = Self::hash_password(&req.password)?;
        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user_id)
        .bind(&email)
        .bind(&req.name)
        .bind(&password_hash)
        .bind(UserRole::User.as_str())
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await;

        // Two concurrent signups can both pass the existence check; the
        // unique constraint decides the winner
        if let Err(e) = inserted {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return Err(AppError::Conflict(
                        "User with this email already exists".to_string(),
                    ));
                }
            }
            return Err(e.into());
        }

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(db.pool())
            .await?;

        OtpService::issue(db, mailer, &user).await?;

        Ok(TwoFactorRequired {
            requires_2fa: true,
            email: user.email,
            name: Some(user.name),
            message: "Account created! Verification code sent to your email".to_string(),
        })
    }

    /// Login. A trusted device gets a session immediately; otherwise a
    /// verification code is issued and no token is returned.
    pub async fn login(
        db: &Database,
        mailer: &dyn Mailer,
        config: &Config,
        req: LoginRequest,
    ) -> Result<LoginOutcome> {
        // One message for both failures, to avoid account enumeration
        let user = Self::find_user_by_email(db, &req.email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

        if !Self::verify_password(&req.password, &user.password_hash)? {
            return Err(AppError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }

        if DeviceService::is_trusted(db, &user.id, &req.device_token).await? {
            let token = Self::generate_token(&user.id, config)?;
            return Ok(LoginOutcome::Authenticated(AuthResponse {
                id: user.id,
                name: user.name,
                email: user.email,
                token,
                role: user.role,
                // Echo the token the device presented
                device_token: Some(req.device_token),
            }));
        }

        OtpService::issue(db, mailer, &user).await?;

        Ok(LoginOutcome::TwoFactorRequired(TwoFactorRequired {
            requires_2fa: true,
            email: user.email,
            name: None,
            message: "Verification code sent to your email".to_string(),
        }))
    }

    /// Complete 2FA: consume the code, mint a session and remember the
    /// device for a week.
    pub async fn verify_2fa(
        db: &Database,
        config: &Config,
        req: Verify2faRequest,
    ) -> Result<AuthResponse> {
        let user = Self::find_user_by_email(db, &req.email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid verification attempt".to_string()))?;

        OtpService::verify(db, &user.id, &req.code).await?;

        let token = Self::generate_token(&user.id, config)?;

        let device_token = if req.device_token.is_empty() {
            DeviceService::generate_token()
        } else {
            req.device_token
        };

        // The user already holds a valid session token; a failure to
        // remember the device must not fail the login
        if let Err(e) = DeviceService::create_session(db, &user.id, &device_token).await {
            tracing::warn!("Failed to create device session: {:?}", e);
        }

        Ok(AuthResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            token,
            role: user.role,
            device_token: Some(device_token),
        })
    }

    /// Case-insensitive user lookup by email
    pub async fn find_user_by_email(db: &Database, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = LOWER(?)")
            .bind(email.trim())
            .fetch_optional(db.pool())
            .await?;
        Ok(user)
    }

    /// Mint a session token (JWT). Signing failures are fatal to the
    /// request; there is no fallback token format.
    pub fn generate_token(user_id: &str, config: &Config) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::days(config.jwt.token_expire_days as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Validate a session token and extract its claims
    pub fn validate_token(token: &str, config: &Config) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt.secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims)
    }

    /// Hash password using Argon2
    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify password against hash
    fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::mock::MockMailer;

    fn signup_req() -> CreateUserRequest {
        CreateUserRequest {
            email: "a@b.com".to_string(),
            password: "secret123".to_string(),
            name: "Ann".to_string(),
        }
    }

    async fn otp_count(db: &Database, email: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM otps WHERE user_id = (SELECT id FROM users WHERE email = ?)",
        )
        .bind(email)
        .fetch_one(db.pool())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn signup_requires_2fa_and_creates_one_otp() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();

        let res = AuthService::signup(&db, &mailer, signup_req()).await.unwrap();

        assert!(res.requires_2fa);
        assert_eq!(res.email, "a@b.com");
        assert_eq!(res.name.as_deref(), Some("Ann"));
        assert_eq!(otp_count(&db, "a@b.com").await, 1);
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts_case_insensitively() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();

        let mut req = signup_req();
        req.email = "A@B.com".to_string();
        let err = AuthService::signup(&db, &mailer, req).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn signup_rejects_malformed_input() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();

        let mut req = signup_req();
        req.email = "not-an-email".to_string();
        assert!(matches!(
            AuthService::signup(&db, &mailer, req).await.unwrap_err(),
            AppError::BadRequest(_)
        ));

        let mut req = signup_req();
        req.password = "short".to_string();
        assert!(matches!(
            AuthService::signup(&db, &mailer, req).await.unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn login_collapses_bad_email_and_bad_password() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();
        let config = Config::default();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();

        let unknown = AuthService::login(
            &db,
            &mailer,
            &config,
            LoginRequest {
                email: "nobody@b.com".to_string(),
                password: "secret123".to_string(),
                device_token: String::new(),
            },
        )
        .await
        .unwrap_err();

        let wrong_pass = AuthService::login(
            &db,
            &mailer,
            &config,
            LoginRequest {
                email: "a@b.com".to_string(),
                password: "wrong-password".to_string(),
                device_token: String::new(),
            },
        )
        .await
        .unwrap_err();

        match (unknown, wrong_pass) {
            (AppError::Unauthorized(a), AppError::Unauthorized(b)) => assert_eq!(a, b),
            other => panic!("expected Unauthorized pair, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn login_on_untrusted_device_requires_2fa() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();
        let config = Config::default();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();

        let outcome = AuthService::login(
            &db,
            &mailer,
            &config,
            LoginRequest {
                email: "a@b.com".to_string(),
                password: "secret123".to_string(),
                device_token: String::new(),
            },
        )
        .await
        .unwrap();

        match outcome {
            LoginOutcome::TwoFactorRequired(res) => {
                assert!(res.requires_2fa);
                assert_eq!(res.email, "a@b.com");
            }
            LoginOutcome::Authenticated(_) => panic!("expected 2FA to be required"),
        }
        // Signup OTP plus login OTP, only the latter still unused
        assert_eq!(otp_count(&db, "a@b.com").await, 2);
    }

    #[tokio::test]
    async fn login_on_trusted_device_skips_2fa() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();
        let config = Config::default();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();
        let user = AuthService::find_user_by_email(&db, "a@b.com")
            .await
            .unwrap()
            .unwrap();
        DeviceService::create_session(&db, &user.id, "trusted-device")
            .await
            .unwrap();

        let outcome = AuthService::login(
            &db,
            &mailer,
            &config,
            LoginRequest {
                email: "a@b.com".to_string(),
                password: "secret123".to_string(),
                device_token: "trusted-device".to_string(),
            },
        )
        .await
        .unwrap();

        match outcome {
            LoginOutcome::Authenticated(res) => {
                assert!(!res.token.is_empty());
                assert_eq!(res.device_token.as_deref(), Some("trusted-device"));
                assert_eq!(res.email, "a@b.com");
            }
            LoginOutcome::TwoFactorRequired(_) => panic!("expected direct session"),
        }
        // No new OTP beyond the signup one
        assert_eq!(otp_count(&db, "a@b.com").await, 1);
    }

    #[tokio::test]
    async fn verify_2fa_issues_session_and_trusts_device() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();
        let config = Config::default();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();
        let code = mailer.sent_codes().remove(0);

        let res = AuthService::verify_2fa(
            &db,
            &config,
            Verify2faRequest {
                email: "A@B.com".to_string(),
                code,
                device_token: String::new(),
            },
        )
        .await
        .unwrap();

        assert!(!res.token.is_empty());
        let device_token = res.device_token.unwrap();
        assert_eq!(device_token.len(), 64);

        let user = AuthService::find_user_by_email(&db, "a@b.com")
            .await
            .unwrap()
            .unwrap();
        assert!(DeviceService::is_trusted(&db, &user.id, &device_token)
            .await
            .unwrap());

        let claims = AuthService::validate_token(&res.token, &config).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn verify_2fa_rejects_unknown_email_and_wrong_code() {
        let db = Database::new_in_memory().await.unwrap();
        let mailer = MockMailer::new();
        let config = Config::default();

        AuthService::signup(&db, &mailer, signup_req()).await.unwrap();
        let issued = mailer.sent_codes().remove(0);

        let unknown = AuthService::verify_2fa(
            &db,
            &config,
            Verify2faRequest {
                email: "nobody@b.com".to_string(),
                code: issued.clone(),
                device_token: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(unknown, AppError::Unauthorized(_)));

        let wrong_code = if issued == "999999" { "999998" } else { "999999" };
        let wrong = AuthService::verify_2fa(
            &db,
            &config,
            Verify2faRequest {
                email: "a@b.com".to_string(),
                code: wrong_code.to_string(),
                device_token: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(wrong, AppError::Unauthorized(_)));
    }

    #[test]
    fn token_roundtrip_carries_subject_and_expiry() {
        let config = Config::default();
        let token = AuthService::generate_token("user-1", &config).unwrap();
        let claims = AuthService::validate_token(&token, &config).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);

        let other = Config {
            jwt: crate::config::JwtConfig {
                secret: "a-different-secret".to_string(),
                token_expire_days: 30,
            },
            ..Config::default()
        };
        assert!(AuthService::validate_token(&token, &other).is_err());
    }
}
