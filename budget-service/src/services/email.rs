//! Outgoing mail for password resets.

use crate::config::EmailSettings;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
        valid_minutes: i64,
    ) -> Result<(), AppError>;
}

/// Picks SMTP delivery when a host is configured, logging otherwise.
pub fn email_provider(settings: &EmailSettings) -> Result<Arc<dyn EmailProvider>, AppError> {
    match &settings.smtp_host {
        Some(host) => Ok(Arc::new(SmtpEmailService::new(host, settings)?)),
        None => {
            tracing::warn!("No SMTP host configured; emails will be logged, not sent");
            Ok(Arc::new(LogEmailService))
        }
    }
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailService {
    pub fn new(host: &str, settings: &EmailSettings) -> Result<Self, AppError> {
        let from: Mailbox = settings.from_address.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid from address: {}", e))
        })?;

        let mut builder = SmtpTransport::starttls_relay(host)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid SMTP host: {}", e)))?
            .port(settings.smtp_port)
            .timeout(Some(Duration::from_secs(10)));

        if let (Some(user), Some(password)) = (&settings.smtp_username, &settings.smtp_password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                password.expose_secret().clone(),
            ));
        }

        tracing::info!(host, port = settings.smtp_port, "Email service initialized");

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let to: Mailbox = to_email
            .parse()
            .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport blocks
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject, "Failed to send email");
                Err(AppError::ServiceUnavailable("Email delivery failed".to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
        valid_minutes: i64,
    ) -> Result<(), AppError> {
        let plain_body = format!(
            "We received a request to reset the password of your Budget account.\n\n\
             Open this link to choose a new password:\n\n{reset_link}\n\n\
             The link expires in {valid_minutes} minutes and works once. \
             If you did not ask for this, ignore this email."
        );
        let html_body = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Reset your password</h2>
        <p>We received a request to reset the password of your Budget account.</p>
        <p><a href="{reset_link}">Choose a new password</a></p>
        <p style="color: #666; font-size: 12px;">
            The link expires in {valid_minutes} minutes and works once. If you did not ask for this, ignore this email.
        </p>
    </body>
</html>"#
        );

        self.send_email(to_email, "Reset your Budget password", plain_body, html_body)
            .await
    }
}

/// Development fallback. The link is never logged since it grants account access.
#[derive(Clone)]
pub struct LogEmailService;

#[async_trait]
impl EmailProvider for LogEmailService {
    async fn send_password_reset_email(
        &self,
        _to_email: &str,
        _reset_link: &str,
        valid_minutes: i64,
    ) -> Result<(), AppError> {
        tracing::warn!(
            valid_minutes,
            "Password reset email not sent: SMTP is not configured"
        );
        Ok(())
    }
}

/// A message captured by [`RecordingEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub link: String,
}

/// Keeps messages in memory instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl RecordingEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn last_link_to(&self, to_email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to_email)
            .map(|m| m.link)
    }
}

#[async_trait]
impl EmailProvider for RecordingEmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_link: &str,
        _valid_minutes: i64,
    ) -> Result<(), AppError> {
        let message = SentEmail {
            to: to_email.to_string(),
            link: reset_link.to_string(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_service_builds_from_settings() {
        let settings = EmailSettings {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_username: Some("mailer".to_string()),
            smtp_password: Some(secrecy::Secret::new("app-password".to_string())),
            from_address: "Budget <no-reply@example.com>".to_string(),
            ..EmailSettings::default()
        };

        assert!(SmtpEmailService::new("smtp.example.com", &settings).is_ok());
    }

    #[test]
    fn invalid_from_address_is_a_config_error() {
        let settings = EmailSettings {
            from_address: "not an address".to_string(),
            ..EmailSettings::default()
        };

        let err = SmtpEmailService::new("smtp.example.com", &settings)
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn without_host_mail_is_only_logged() {
        assert!(email_provider(&EmailSettings::default()).is_ok());
    }

    #[tokio::test]
    async fn recording_service_keeps_links_per_recipient() {
        let mailer = RecordingEmailService::new();

        mailer
            .send_password_reset_email("a@example.com", "http://x/reset?token=1", 60)
            .await
            .unwrap();
        mailer
            .send_password_reset_email("b@example.com", "http://x/reset?token=2", 60)
            .await
            .unwrap();
        mailer
            .send_password_reset_email("a@example.com", "http://x/reset?token=3", 60)
            .await
            .unwrap();

        assert_eq!(mailer.sent().len(), 3);
        assert_eq!(
            mailer.last_link_to("a@example.com").as_deref(),
            Some("http://x/reset?token=3")
        );
        assert_eq!(mailer.last_link_to("c@example.com"), None);
    }
}
