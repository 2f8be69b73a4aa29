use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{BatchRow, BatchStatus, NotificationBatch};

/// Progress records for paced notification batches.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn create(&self, label: &str, total: i32) -> anyhow::Result<NotificationBatch>;
    async fn mark_running(&self, id: Uuid) -> anyhow::Result<()>;
    async fn complete(&self, id: Uuid, sent: i32, failed: i32) -> anyhow::Result<()>;
    #[cfg(test)]
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<NotificationBatch>>;
    /// Flags every queued or running batch as interrupted and returns them.
    async fn recover_interrupted(&self) -> anyhow::Result<Vec<NotificationBatch>>;
}

const BATCH_COLUMNS: &str = "id, label, total, sent, failed, status, created_at, finished_at";

pub struct PgBatchStore {
    db: PgPool,
}

impl PgBatchStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    async fn create(&self, label: &str, total: i32) -> anyhow::Result<NotificationBatch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            INSERT INTO notification_batches (id, label, total, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(label)
        .bind(total)
        .bind(BatchStatus::Queued.as_str())
        .fetch_one(&self.db)
        .await
        .context("insert notification batch")?;
        row.try_into()
    }

    async fn mark_running(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE notification_batches SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(BatchStatus::Running.as_str())
            .execute(&self.db)
            .await
            .context("mark batch running")?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, sent: i32, failed: i32) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_batches
               SET status = $4, sent = $2, failed = $3, finished_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .bind(BatchStatus::Completed.as_str())
        .execute(&self.db)
        .await
        .context("complete batch")?;
        Ok(())
    }

    #[cfg(test)]
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<NotificationBatch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM notification_batches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find notification batch")?;
        row.map(NotificationBatch::try_from).transpose()
    }

    async fn recover_interrupted(&self) -> anyhow::Result<Vec<NotificationBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE notification_batches
               SET status = $1, finished_at = NOW()
             WHERE status IN ($2, $3)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(BatchStatus::Interrupted.as_str())
        .bind(BatchStatus::Queued.as_str())
        .bind(BatchStatus::Running.as_str())
        .fetch_all(&self.db)
        .await
        .context("recover interrupted batches")?;
        rows.into_iter().map(NotificationBatch::try_from).collect()
    }
}

#[cfg(test)]
pub use memory::InMemoryBatchStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;

    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryBatchStore {
        batches: RwLock<HashMap<Uuid, NotificationBatch>>,
    }

    #[async_trait]
    impl BatchStore for InMemoryBatchStore {
        async fn create(&self, label: &str, total: i32) -> anyhow::Result<NotificationBatch> {
            let batch = NotificationBatch {
                id: Uuid::new_v4(),
                label: label.to_string(),
                total,
                sent: 0,
                failed: 0,
                status: BatchStatus::Queued,
                created_at: OffsetDateTime::now_utc(),
                finished_at: None,
            };
            self.batches.write().await.insert(batch.id, batch.clone());
            Ok(batch)
        }

        async fn mark_running(&self, id: Uuid) -> anyhow::Result<()> {
            if let Some(b) = self.batches.write().await.get_mut(&id) {
                b.status = BatchStatus::Running;
            }
            Ok(())
        }

        async fn complete(&self, id: Uuid, sent: i32, failed: i32) -> anyhow::Result<()> {
            if let Some(b) = self.batches.write().await.get_mut(&id) {
                b.status = BatchStatus::Completed;
                b.sent = sent;
                b.failed = failed;
                b.finished_at = Some(OffsetDateTime::now_utc());
            }
            Ok(())
        }

        async fn find(&self, id: Uuid) -> anyhow::Result<Option<NotificationBatch>> {
            Ok(self.batches.read().await.get(&id).cloned())
        }

        async fn recover_interrupted(&self) -> anyhow::Result<Vec<NotificationBatch>> {
            let mut batches = self.batches.write().await;
            let now = OffsetDateTime::now_utc();
            let mut recovered = Vec::new();
            for b in batches.values_mut() {
                if matches!(b.status, BatchStatus::Queued | BatchStatus::Running) {
                    b.status = BatchStatus::Interrupted;
                    b.finished_at = Some(now);
                    recovered.push(b.clone());
                }
            }
            Ok(recovered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unfinished_batches_are_flagged_on_recovery() {
        let store = InMemoryBatchStore::default();
        let queued = store.create("activity:a", 3).await.unwrap();
        let running = store.create("activity:b", 2).await.unwrap();
        let done = store.create("activity:c", 1).await.unwrap();
        store.mark_running(running.id).await.unwrap();
        store.mark_running(done.id).await.unwrap();
        store.complete(done.id, 1, 0).await.unwrap();

        let mut recovered: Vec<_> = store
            .recover_interrupted()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        recovered.sort();
        let mut expected = vec![queued.id, running.id];
        expected.sort();
        assert_eq!(recovered, expected);

        let done = store.find(done.id).await.unwrap().unwrap();
        assert_eq!(done.status, BatchStatus::Completed);
        assert!(store.recover_interrupted().await.unwrap().is_empty());
    }
}
