use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Queued,
    Running,
    Completed,
    /// Found queued or running at startup: the process stopped mid-batch.
    Interrupted,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Interrupted => "interrupted",
        }
    }
}

impl TryFrom<&str> for BatchStatus {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(BatchStatus::Queued),
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            "interrupted" => Ok(BatchStatus::Interrupted),
            other => anyhow::bail!("unknown batch status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBatch {
    pub id: Uuid,
    pub label: String,
    pub total: i32,
    pub sent: i32,
    pub failed: i32,
    pub status: BatchStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

#[derive(Debug, FromRow)]
pub(crate) struct BatchRow {
    pub id: Uuid,
    pub label: String,
    pub total: i32,
    pub sent: i32,
    pub failed: i32,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

impl TryFrom<BatchRow> for NotificationBatch {
    type Error = anyhow::Error;

    fn try_from(r: BatchRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            label: r.label,
            total: r.total,
            sent: r.sent,
            failed: r.failed,
            status: BatchStatus::try_from(r.status.as_str())?,
            created_at: r.created_at,
            finished_at: r.finished_at,
        })
    }
}
