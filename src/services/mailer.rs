use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::error::AppError;

/// Mail delivery is an external collaborator: the service hands a
/// verification token to it and reacts to the callback later; it never
/// drives the verification itself.
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_link_verification(
        &self,
        to_email: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Verification mailer initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }
}

#[async_trait]
impl VerificationMailer for SmtpMailer {
    async fn send_link_verification(
        &self,
        to_email: &str,
        token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let verification_link = format!(
            "{}/settings/auth-methods/email/verify?token={}",
            base_url, token
        );

        let plain_body = format!(
            "Confirm linking this email address to your account by visiting:\n\n{}\n\nIf you didn't request this, ignore this email.",
            verification_link
        );
        let html_body = format!(
            r#"<html><body style="font-family: Arial, sans-serif;">
                <h2>Link this email to your account</h2>
                <p><a href="{}">Confirm email link</a></p>
                <p style="color: #666; font-size: 12px;">If you didn't request this, ignore this email.</p>
            </body></html>"#,
            verification_link
        );

        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject("Confirm your email link")
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // Send in the blocking pool; SmtpTransport is synchronous.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, "Verification email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send verification email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

/// Records outgoing tokens instead of sending mail. Used in dev mode and
/// by the tests to drive the verification callback.
#[derive(Default)]
pub struct MockMailer {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent token sent to `to_email`, if any.
    pub fn last_token_for(&self, to_email: &str) -> Option<String> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .iter()
            .rev()
            .find(|(to, _)| to == to_email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl VerificationMailer for MockMailer {
    async fn send_link_verification(
        &self,
        to_email: &str,
        token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push((to_email.to_string(), token.to_string()));
        Ok(())
    }
}
