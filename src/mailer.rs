use axum::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Outbound email delivery. Callers never block their request path on the
/// result; failures stay in the log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.password.clone());
        let transport = SmtpTransport::starttls_relay(&cfg.host)
            .map_err(|e| anyhow::anyhow!("smtp relay: {e}"))?
            .credentials(creds)
            .port(cfg.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();
        info!(host = %cfg.host, port = cfg.port, "smtp mailer initialized");
        Ok(Self {
            transport,
            from: cfg.user.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        // lettre's sync transport; keep the runtime free while it talks SMTP.
        let transport = self.transport.clone();
        let result = tokio::task::spawn_blocking(move || transport.send(&email)).await?;
        match result {
            Ok(_) => {
                info!(to = %to, subject = %subject, "email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, to = %to, "failed to send email");
                Err(anyhow::anyhow!("smtp send: {e}"))
            }
        }
    }
}
