use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// What triggered an email; stored on every log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Feedback,
    Booking,
    Message,
    Notification,
}

impl EmailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailKind::Feedback => "feedback",
            EmailKind::Booking => "booking",
            EmailKind::Message => "message",
            EmailKind::Notification => "notification",
        }
    }
}

impl fmt::Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EmailKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "feedback" => Ok(EmailKind::Feedback),
            "booking" => Ok(EmailKind::Booking),
            "message" => Ok(EmailKind::Message),
            "notification" => Ok(EmailKind::Notification),
            other => anyhow::bail!("unknown email kind {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for EmailStatus {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "sent" => Ok(EmailStatus::Sent),
            "failed" => Ok(EmailStatus::Failed),
            other => anyhow::bail!("unknown email status {other:?}"),
        }
    }
}

/// Final outcome of one `send` call. Never updated after insert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub kind: EmailKind,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub related_to: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub to: String,
    pub subject: String,
    pub kind: EmailKind,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub related_to: Option<String>,
}

#[derive(Debug, FromRow)]
pub(crate) struct EmailLogRow {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub kind: String,
    pub status: String,
    pub error: Option<String>,
    pub related_to: Option<String>,
    pub sent_at: OffsetDateTime,
}

impl TryFrom<EmailLogRow> for EmailLogEntry {
    type Error = anyhow::Error;

    fn try_from(r: EmailLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            to: r.recipient,
            subject: r.subject,
            kind: EmailKind::try_from(r.kind.as_str())?,
            status: EmailStatus::try_from(r.status.as_str())?,
            error: r.error,
            related_to: r.related_to,
            sent_at: r.sent_at,
        })
    }
}
