//! Send emails to users for account confirmations.
//!
//! Handlers only enqueue; a background task delivers one email at a time with
//! bounded retries, so a stalled relay fills the queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;

use crate::config::Mail as MailConfig;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_QUEUE_SIZE: usize = 256;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("unable to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("mail queue is full")]
    QueueFull,
    #[error("mail queue is closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Outgoing plain text email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Deliver through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Create a new [`SmtpMailer`].
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                .port(config.port.unwrap_or(DEFAULT_SMTP_PORT));

        if let (Some(username), Some(password)) =
            (&config.username, &config.password)
        {
            transport = transport
                .credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(host = %config.host, "smtp relay configured");

        Ok(Self {
            transport: transport.build(),
            from: config.from.clone(),
        })
    }

    fn message(&self, email: &Email) -> Result<Message, MailError> {
        Ok(Message::builder()
            .from(self.from.parse()?)
            .to(email.to.parse()?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.message(email)?;
        self.transport.send(message).await?;

        Ok(())
    }
}

/// Used when no SMTP relay is configured: log and drop.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        // Bodies carry live links.
        tracing::debug!(
            to = %email.to,
            subject = %email.subject,
            "no smtp relay configured, email dropped"
        );

        Ok(())
    }
}

/// Queue in front of a [`Mailer`].
#[derive(Clone, Debug)]
pub struct MailDispatcher {
    sender: mpsc::Sender<Email>,
}

impl MailDispatcher {
    /// Spawn the delivery task. Must be called within a tokio runtime.
    pub fn new(
        mailer: Arc<dyn Mailer>,
        queue_size: usize,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        tokio::spawn(worker(receiver, mailer, max_attempts.max(1), backoff));

        Self { sender }
    }

    /// Build the dispatcher described by configuration.
    pub fn from_config(config: Option<&MailConfig>) -> Result<Self, MailError> {
        Ok(match config {
            Some(config) => Self::new(
                Arc::new(SmtpMailer::new(config)?),
                config.queue_size,
                config.max_attempts,
                DEFAULT_BACKOFF,
            ),
            None => {
                tracing::warn!("no smtp relay configured, emails are only logged");
                Self::new(
                    Arc::new(LogMailer),
                    DEFAULT_QUEUE_SIZE,
                    DEFAULT_MAX_ATTEMPTS,
                    DEFAULT_BACKOFF,
                )
            },
        })
    }

    /// Enqueue an email without waiting for delivery.
    pub fn dispatch(&self, email: Email) -> Result<(), MailError> {
        self.sender.try_send(email).map_err(|err| {
            let err = match err {
                mpsc::error::TrySendError::Full(_) => MailError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => MailError::Closed,
            };
            tracing::warn!(error = %err, "email not enqueued");
            metrics::counter!("emails_sent_total", "result" => "rejected")
                .increment(1);
            err
        })
    }
}

async fn worker(
    mut receiver: mpsc::Receiver<Email>,
    mailer: Arc<dyn Mailer>,
    max_attempts: u32,
    backoff: Duration,
) {
    while let Some(email) = receiver.recv().await {
        deliver(mailer.as_ref(), email, max_attempts, backoff).await;
    }

    tracing::debug!("mail queue closed");
}

async fn deliver(
    mailer: &dyn Mailer,
    email: Email,
    max_attempts: u32,
    backoff: Duration,
) {
    let mut delay = backoff;

    for attempt in 1..=max_attempts {
        match mailer.send(&email).await {
            Ok(()) => {
                tracing::debug!(to = %email.to, attempt, "email sent");
                metrics::counter!("emails_sent_total", "result" => "ok")
                    .increment(1);
                return;
            },
            Err(err) if attempt < max_attempts => {
                tracing::warn!(error = %err, to = %email.to, attempt, "email delivery failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            },
            Err(err) => {
                tracing::error!(error = %err, to = %email.to, attempt, "email dropped");
            },
        }
    }

    metrics::counter!("emails_sent_total", "result" => "failed").increment(1);
}
