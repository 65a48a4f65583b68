use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::EmailConfig;
use crate::error::{AppError, Result};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Outbound transactional-email sender
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a verification code to the user's email address
    async fn send_otp(&self, to: &str, name: &str, code: &str) -> Result<()>;
}

#[derive(Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

/// Mailer backed by the Resend HTTP API
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(config: &EmailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: config.resend_api_key.clone(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_otp(&self, to: &str, name: &str, code: &str) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AppError::Email(
                "Resend API key is not configured".to_string(),
            ));
        }

        let body = ResendEmailRequest {
            from: &self.from,
            to: [to],
            subject: format!("Your Linklet verification code: {}", code),
            html: otp_email_html(name, code),
        };

        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Email(format!("Failed to send email: {}", e)))?;

        if response.status().is_client_error() || response.status().is_server_error() {
            return Err(AppError::Email(format!(
                "Resend API error: status {}",
                response.status().as_u16()
            )));
        }

        tracing::debug!(to = %to, "OTP email dispatched");
        Ok(())
    }
}

fn otp_email_html(name: &str, code: &str) -> String {
    let name = if name.is_empty() { "there" } else { name };
    format!(
        r#"<html>
<body style="font-family: sans-serif;">
  <h2>Verification code</h2>
  <p>Hi {}! Use the code below to complete your sign-in to Linklet.</p>
  <p style="font-size: 32px; font-weight: bold; letter-spacing: 8px;">{}</p>
  <p>This code expires in 10 minutes.</p>
  <p style="color: #64748b; font-size: 12px;">
    Never share this code with anyone. If you didn't request it, you can
    safely ignore this email.
  </p>
</body>
</html>"#,
        name, code
    )
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Test mailer that records every dispatch instead of sending
    #[derive(Default)]
    pub struct MockMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl MockMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent_codes(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, code)| code.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send_otp(&self, to: &str, _name: &str, code: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::Email("mock delivery failure".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), code.to_string()));
            Ok(())
        }
    }
}
