use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Activity, NewActivity};

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn create(&self, new: NewActivity) -> anyhow::Result<Activity>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Activity>>;
}

pub struct PgActivityStore {
    db: PgPool,
}

impl PgActivityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn create(&self, new: NewActivity) -> anyhow::Result<Activity> {
        sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (id, title, description, scheduled_for, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, description, scheduled_for, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.scheduled_for)
        .bind(new.created_by)
        .fetch_one(&self.db)
        .await
        .context("insert activity")
    }

    async fn list(&self) -> anyhow::Result<Vec<Activity>> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, title, description, scheduled_for, created_by, created_at
              FROM activities
             ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list activities")
    }
}

#[cfg(test)]
pub use memory::InMemoryActivityStore;

#[cfg(test)]
mod memory {
    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryActivityStore {
        activities: RwLock<Vec<Activity>>,
    }

    #[async_trait]
    impl ActivityStore for InMemoryActivityStore {
        async fn create(&self, new: NewActivity) -> anyhow::Result<Activity> {
            let activity = Activity {
                id: Uuid::new_v4(),
                title: new.title,
                description: new.description,
                scheduled_for: new.scheduled_for,
                created_by: new.created_by,
                created_at: OffsetDateTime::now_utc(),
            };
            self.activities.write().await.push(activity.clone());
            Ok(activity)
        }

        async fn list(&self) -> anyhow::Result<Vec<Activity>> {
            Ok(self.activities.read().await.iter().rev().cloned().collect())
        }
    }
}
