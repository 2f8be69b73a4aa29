use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{ContactMessage, NewContactMessage};

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, new: NewContactMessage) -> anyhow::Result<ContactMessage>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<ContactMessage>>;
}

pub struct PgMessageStore {
    db: PgPool,
}

impl PgMessageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, new: NewContactMessage) -> anyhow::Result<ContactMessage> {
        sqlx::query_as::<_, ContactMessage>(
            r#"
            INSERT INTO messages (id, name, email, subject, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, subject, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.subject)
        .bind(&new.message)
        .fetch_one(&self.db)
        .await
        .context("insert contact message")
    }

    async fn list(&self) -> anyhow::Result<Vec<ContactMessage>> {
        sqlx::query_as::<_, ContactMessage>(
            "SELECT id, name, email, subject, message, created_at FROM messages ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await
        .context("list contact messages")
    }
}

#[cfg(test)]
pub use memory::InMemoryMessageStore;

#[cfg(test)]
mod memory {
    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryMessageStore {
        messages: RwLock<Vec<ContactMessage>>,
    }

    #[async_trait]
    impl MessageStore for InMemoryMessageStore {
        async fn create(&self, new: NewContactMessage) -> anyhow::Result<ContactMessage> {
            let msg = ContactMessage {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                subject: new.subject,
                message: new.message,
                created_at: OffsetDateTime::now_utc(),
            };
            self.messages.write().await.push(msg.clone());
            Ok(msg)
        }

        async fn list(&self) -> anyhow::Result<Vec<ContactMessage>> {
            Ok(self.messages.read().await.iter().rev().cloned().collect())
        }
    }
}
