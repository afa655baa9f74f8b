use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::debug;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("failed to send email: {0}")]
    SendFailed(String),

    #[error("invalid email configuration: {0}")]
    InvalidConfig(String),
}

/// Outbound mail capability. The reset flow is the only caller.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self, EmailError> {
        let mut builder = if !cfg.smtp_tls {
            // Plaintext transport for local dev relays (mailhog and friends).
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
        } else if cfg.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
                .map_err(|e| EmailError::InvalidConfig(format!("smtp relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
                .map_err(|e| EmailError::InvalidConfig(format!("smtp relay: {}", e)))?
        };
        builder = builder.port(cfg.smtp_port);

        if let (Some(user), Some(pass)) = (cfg.smtp_username.clone(), cfg.smtp_password.clone()) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from: cfg.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self
                .from
                .parse()
                .map_err(|e| EmailError::InvalidConfig(format!("invalid from address: {}", e)))?)
            .to(to
                .parse()
                .map_err(|e| EmailError::SendFailed(format!("invalid recipient: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;
        debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EmailError::SendFailed("connection refused".into());
        assert_eq!(err.to_string(), "failed to send email: connection refused");
    }

    #[tokio::test]
    async fn send_rejects_invalid_recipient() {
        let cfg = EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            smtp_username: None,
            smtp_password: None,
            smtp_tls: false,
            from_address: "Trailhead <noreply@trailhead.dev>".into(),
            public_base_url: "http://localhost:8080".into(),
        };
        let mailer = SmtpMailer::from_config(&cfg).unwrap();
        let err = mailer.send("not-an-address", "subject", "body").await.unwrap_err();
        assert!(matches!(err, EmailError::SendFailed(_)));
    }
}
