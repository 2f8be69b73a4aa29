use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{EmailLogEntry, EmailLogRow, NewEmailLog};

/// Append-only delivery log.
#[async_trait]
pub trait EmailLogStore: Send + Sync {
    async fn append(&self, entry: NewEmailLog) -> anyhow::Result<EmailLogEntry>;
    /// Newest first.
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<EmailLogEntry>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

pub struct PgEmailLogStore {
    db: PgPool,
}

impl PgEmailLogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmailLogStore for PgEmailLogStore {
    async fn append(&self, entry: NewEmailLog) -> anyhow::Result<EmailLogEntry> {
        let row = sqlx::query_as::<_, EmailLogRow>(
            r#"
            INSERT INTO email_logs (id, recipient, subject, kind, status, error, related_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, recipient, subject, kind, status, error, related_to, sent_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.to)
        .bind(&entry.subject)
        .bind(entry.kind.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(&entry.related_to)
        .fetch_one(&self.db)
        .await
        .context("insert email log")?;
        EmailLogEntry::try_from(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<EmailLogEntry>> {
        let rows = sqlx::query_as::<_, EmailLogRow>(
            r#"
            SELECT id, recipient, subject, kind, status, error, related_to, sent_at
              FROM email_logs
             ORDER BY sent_at DESC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list email logs")?;
        rows.into_iter().map(EmailLogEntry::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM email_logs WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete email log")?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
pub use memory::InMemoryEmailLogStore;

#[cfg(test)]
mod memory {
    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryEmailLogStore {
        entries: RwLock<Vec<EmailLogEntry>>,
    }

    impl InMemoryEmailLogStore {
        pub async fn all(&self) -> Vec<EmailLogEntry> {
            self.entries.read().await.clone()
        }
    }

    #[async_trait]
    impl EmailLogStore for InMemoryEmailLogStore {
        async fn append(&self, entry: NewEmailLog) -> anyhow::Result<EmailLogEntry> {
            let logged = EmailLogEntry {
                id: Uuid::new_v4(),
                to: entry.to,
                subject: entry.subject,
                kind: entry.kind,
                status: entry.status,
                error: entry.error,
                related_to: entry.related_to,
                sent_at: OffsetDateTime::now_utc(),
            };
            self.entries.write().await.push(logged.clone());
            Ok(logged)
        }

        async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<EmailLogEntry>> {
            let entries = self.entries.read().await;
            Ok(entries
                .iter()
                .rev()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|e| e.id != id);
            Ok(entries.len() != before)
        }
    }
}
