//! SMTP email channel.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::AppResult;

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns `Ok(true)` on delivery, `Ok(false)` when the channel is
    /// disabled or unconfigured. Transport failures are `Err` so the queue
    /// can retry them.
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> AppResult<bool>;
}

pub struct SmtpEmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Self {
        let transport = if config.is_configured() {
            let credentials =
                Credentials::new(config.username.clone(), config.password.clone());
            match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host) {
                Ok(builder) => Some(
                    builder
                        .credentials(credentials)
                        .port(config.port)
                        .pool_config(PoolConfig::new().max_size(4))
                        .build(),
                ),
                Err(err) => {
                    warn!(host = %config.host, error = %err, "SMTP transport setup failed");
                    None
                }
            }
        } else {
            warn!("SMTP not configured, email notifications disabled");
            None
        };

        Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailService {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> AppResult<bool> {
        let Some(transport) = &self.transport else {
            warn!(to, subject, "email skipped, SMTP unavailable");
            return Ok(false);
        };

        let message = Message::builder()
            .from(format!("{} <{}>", self.from_name, self.from_email).parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        transport.send(message).await?;
        info!(to, subject, "email sent");
        Ok(true)
    }
}
