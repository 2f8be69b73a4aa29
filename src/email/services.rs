use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{
    provider::{EmailProvider, ProviderError, ProviderReceipt},
    repo::EmailLogStore,
    repo_types::{EmailKind, EmailStatus, NewEmailLog},
};
use crate::{config::EmailConfig, error::AppError};

/// `name <email>` when a display name is configured, bare email otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub email: String,
    pub name: Option<String>,
}

impl SenderIdentity {
    pub fn from_config(cfg: &EmailConfig) -> Option<Self> {
        cfg.from_email.as_ref().map(|email| Self {
            email: email.clone(),
            name: cfg.from_name.clone(),
        })
    }
}

impl fmt::Display for SenderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => f.write_str(&self.email),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub headers: Vec<(String, String)>,
    pub attachments: Vec<Attachment>,
    pub kind: EmailKind,
    pub related_to: Option<String>,
}

impl OutgoingEmail {
    pub fn related_to(mut self, id: impl Into<String>) -> Self {
        self.related_to = Some(id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Fixed-delay retry: `max_attempts` calls at most, `backoff` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(cfg: &EmailConfig) -> Self {
        Self::new(cfg.max_retries, Duration::from_millis(cfg.retry_backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service is not configured")]
    NotConfigured,
    #[error("{0}")]
    Invalid(String),
    #[error("Failed to send email: {0}")]
    Delivery(String),
}

impl From<EmailError> for AppError {
    fn from(e: EmailError) -> Self {
        match e {
            EmailError::NotConfigured => AppError::EmailNotConfigured,
            EmailError::Invalid(msg) => AppError::BadRequest(msg),
            e @ EmailError::Delivery(_) => AppError::EmailDelivery(e.to_string()),
        }
    }
}

pub struct EmailService {
    provider: Option<Arc<dyn EmailProvider>>,
    sender: Option<SenderIdentity>,
    logs: Arc<dyn EmailLogStore>,
    policy: RetryPolicy,
}

impl EmailService {
    pub fn new(
        provider: Option<Arc<dyn EmailProvider>>,
        sender: Option<SenderIdentity>,
        logs: Arc<dyn EmailLogStore>,
        policy: RetryPolicy,
    ) -> Self {
        if provider.is_none() {
            warn!("email provider not configured; outgoing email disabled");
        } else if sender.is_none() {
            warn!("sender address not configured; outgoing email disabled");
        }
        Self {
            provider,
            sender,
            logs,
            policy,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some() && self.sender.is_some()
    }

    pub fn logs(&self) -> &Arc<dyn EmailLogStore> {
        &self.logs
    }

    /// Builds a message from the configured sender identity.
    pub fn compose(
        &self,
        to: &str,
        subject: impl Into<String>,
        html: impl Into<String>,
        kind: EmailKind,
    ) -> Result<OutgoingEmail, EmailError> {
        let sender = match (&self.provider, &self.sender) {
            (Some(_), Some(sender)) => sender,
            _ => return Err(EmailError::NotConfigured),
        };
        Ok(OutgoingEmail {
            from: sender.to_string(),
            to: to.to_string(),
            subject: subject.into(),
            html: html.into(),
            headers: Vec::new(),
            attachments: Vec::new(),
            kind,
            related_to: None,
        })
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<ProviderReceipt, EmailError> {
        self.send_with(email, self.policy).await
    }

    /// Validates, then calls the provider until the first success or until
    /// `policy.max_attempts` is spent. Exactly one log entry is written per
    /// call that passes validation.
    pub async fn send_with(
        &self,
        email: &OutgoingEmail,
        policy: RetryPolicy,
    ) -> Result<ProviderReceipt, EmailError> {
        validate(email)?;
        let Some(provider) = self.provider.as_ref() else {
            return Err(EmailError::NotConfigured);
        };

        let attempts = policy.max_attempts.max(1);
        let mut last_err: Option<ProviderError> = None;
        for attempt in 1..=attempts {
            match provider.deliver(email).await {
                Ok(receipt) => {
                    info!(to = %email.to, kind = %email.kind, attempt, "email sent");
                    self.record(email, EmailStatus::Sent, None).await;
                    return Ok(receipt);
                }
                Err(e) => {
                    warn!(to = %email.to, kind = %email.kind, attempt, error = %e.detail(), "email attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(policy.backoff).await;
                    }
                }
            }
        }

        let detail = last_err
            .map(|e| e.detail())
            .unwrap_or_else(|| "unknown provider error".to_string());
        error!(to = %email.to, kind = %email.kind, attempts, error = %detail, "email delivery gave up");
        self.record(email, EmailStatus::Failed, Some(detail.clone())).await;
        Err(EmailError::Delivery(detail))
    }

    async fn record(&self, email: &OutgoingEmail, status: EmailStatus, error_detail: Option<String>) {
        let entry = NewEmailLog {
            to: email.to.clone(),
            subject: email.subject.clone(),
            kind: email.kind,
            status,
            error: error_detail,
            related_to: email.related_to.clone(),
        };
        if let Err(e) = self.logs.append(entry).await {
            error!(error = %e, to = %email.to, "failed to write email log");
        }
    }
}

fn validate(email: &OutgoingEmail) -> Result<(), EmailError> {
    if !email.from.contains('@') {
        return Err(EmailError::Invalid("Invalid sender address".into()));
    }
    if !email.to.contains('@') {
        return Err(EmailError::Invalid("Invalid recipient address".into()));
    }
    if email.subject.trim().is_empty() {
        return Err(EmailError::Invalid("Subject is required".into()));
    }
    if email.html.trim().is_empty() {
        return Err(EmailError::Invalid("Email body is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{
        provider::testing::{FlakyProvider, RecordingProvider},
        repo::InMemoryEmailLogStore,
    };

    fn sender() -> Option<SenderIdentity> {
        Some(SenderIdentity {
            email: "hello@websitesarena.com".into(),
            name: Some("Websites Arena".into()),
        })
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5))
    }

    #[test]
    fn sender_identity_formats_with_and_without_name() {
        assert_eq!(
            sender().unwrap().to_string(),
            "Websites Arena <hello@websitesarena.com>"
        );
        let bare = SenderIdentity {
            email: "hello@websitesarena.com".into(),
            name: None,
        };
        assert_eq!(bare.to_string(), "hello@websitesarena.com");
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_with_one_sent_log() {
        let logs = Arc::new(InMemoryEmailLogStore::default());
        let provider = Arc::new(FlakyProvider::new(2));
        let svc = EmailService::new(Some(provider.clone()), sender(), logs.clone(), fast());

        let msg = svc
            .compose("client@example.com", "Hi", "<p>Hi</p>", EmailKind::Notification)
            .unwrap();
        let receipt = svc.send(&msg).await.expect("third attempt succeeds");

        assert_eq!(receipt.id.as_deref(), Some("flaky-ok"));
        assert_eq!(provider.calls(), 3);
        let entries = logs.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EmailStatus::Sent);
        assert!(entries[0].error.is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_write_one_failed_log() {
        let logs = Arc::new(InMemoryEmailLogStore::default());
        let provider = Arc::new(FlakyProvider::new(usize::MAX));
        let svc = EmailService::new(Some(provider.clone()), sender(), logs.clone(), fast());

        let msg = svc
            .compose("client@example.com", "Hi", "<p>Hi</p>", EmailKind::Booking)
            .unwrap()
            .related_to("booking-42");
        let err = svc.send(&msg).await.unwrap_err();

        assert!(matches!(err, EmailError::Delivery(_)));
        assert_eq!(provider.calls(), 3);
        let entries = logs.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EmailStatus::Failed);
        assert_eq!(entries[0].kind, EmailKind::Booking);
        assert_eq!(entries[0].related_to.as_deref(), Some("booking-42"));
        let detail = entries[0].error.as_deref().unwrap();
        assert!(detail.contains("attempt 3 failed"));
        assert!(detail.contains("rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn backoff_is_fixed_between_attempts() {
        let logs = Arc::new(InMemoryEmailLogStore::default());
        let provider = Arc::new(FlakyProvider::new(usize::MAX));
        let svc = EmailService::new(Some(provider), sender(), logs, fast());
        let msg = svc
            .compose("client@example.com", "Hi", "<p>Hi</p>", EmailKind::Message)
            .unwrap();

        let started = std::time::Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_millis(40));
        let _ = svc.send_with(&msg, policy).await;
        // two waits between three attempts
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn invalid_envelope_fails_fast_without_logging() {
        let logs = Arc::new(InMemoryEmailLogStore::default());
        let provider = Arc::new(FlakyProvider::new(0));
        let svc = EmailService::new(Some(provider.clone()), sender(), logs.clone(), fast());

        let mut msg = svc
            .compose("not-an-address", "Hi", "<p>Hi</p>", EmailKind::Message)
            .unwrap();
        assert!(matches!(svc.send(&msg).await, Err(EmailError::Invalid(_))));

        msg.to = "ok@example.com".into();
        msg.subject = "  ".into();
        assert!(matches!(svc.send(&msg).await, Err(EmailError::Invalid(_))));

        msg.subject = "Hi".into();
        msg.html = String::new();
        assert!(matches!(svc.send(&msg).await, Err(EmailError::Invalid(_))));

        assert_eq!(provider.calls(), 0);
        assert!(logs.all().await.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_service_refuses_to_compose() {
        let logs = Arc::new(InMemoryEmailLogStore::default());
        let no_provider = EmailService::new(None, sender(), logs.clone(), fast());
        assert!(!no_provider.is_configured());
        assert!(matches!(
            no_provider.compose("a@b.co", "s", "h", EmailKind::Message),
            Err(EmailError::NotConfigured)
        ));

        let no_sender = EmailService::new(
            Some(Arc::new(RecordingProvider::default())),
            None,
            logs.clone(),
            fast(),
        );
        assert!(matches!(
            no_sender.compose("a@b.co", "s", "h", EmailKind::Message),
            Err(EmailError::NotConfigured)
        ));

        // a hand-built message still needs a provider
        let msg = OutgoingEmail {
            from: "x@y.co".into(),
            to: "a@b.co".into(),
            subject: "s".into(),
            html: "h".into(),
            headers: vec![],
            attachments: vec![],
            kind: EmailKind::Message,
            related_to: None,
        };
        assert!(matches!(
            no_provider.send(&msg).await,
            Err(EmailError::NotConfigured)
        ));
        assert!(logs.all().await.is_empty());
    }
}
