use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Developer, NewDeveloper};
use crate::{db::is_unique_violation, error::StoreError};

#[async_trait]
pub trait DeveloperStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Developer>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Developer>>;
    async fn list(&self) -> anyhow::Result<Vec<Developer>>;
    async fn create(&self, new: NewDeveloper) -> Result<Developer, StoreError>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

const DEVELOPER_COLUMNS: &str = "id, name, email, phone, payment_details, password_hash, created_at";

pub struct PgDeveloperStore {
    db: PgPool,
}

impl PgDeveloperStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeveloperStore for PgDeveloperStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Developer>> {
        sqlx::query_as::<_, Developer>(&format!(
            "SELECT {DEVELOPER_COLUMNS} FROM developers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find developer by id")
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Developer>> {
        sqlx::query_as::<_, Developer>(&format!(
            "SELECT {DEVELOPER_COLUMNS} FROM developers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find developer by email")
    }

    async fn list(&self) -> anyhow::Result<Vec<Developer>> {
        sqlx::query_as::<_, Developer>(&format!(
            "SELECT {DEVELOPER_COLUMNS} FROM developers ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list developers")
    }

    async fn create(&self, new: NewDeveloper) -> Result<Developer, StoreError> {
        let res = sqlx::query_as::<_, Developer>(&format!(
            r#"
            INSERT INTO developers (id, name, email, phone, payment_details, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DEVELOPER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.payment_details)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(dev) => Ok(dev),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate { field: "email" }),
            Err(e) => Err(anyhow::Error::new(e).context("insert developer").into()),
        }
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM developers WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete developer")?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
pub use memory::InMemoryDeveloperStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;

    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryDeveloperStore {
        developers: RwLock<HashMap<Uuid, Developer>>,
    }

    #[async_trait]
    impl DeveloperStore for InMemoryDeveloperStore {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Developer>> {
            Ok(self.developers.read().await.get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Developer>> {
            Ok(self
                .developers
                .read()
                .await
                .values()
                .find(|d| d.email == email)
                .cloned())
        }

        async fn list(&self) -> anyhow::Result<Vec<Developer>> {
            let mut all: Vec<Developer> = self.developers.read().await.values().cloned().collect();
            all.sort_by_key(|d| d.created_at);
            Ok(all)
        }

        async fn create(&self, new: NewDeveloper) -> Result<Developer, StoreError> {
            let mut developers = self.developers.write().await;
            if developers.values().any(|d| d.email == new.email) {
                return Err(StoreError::Duplicate { field: "email" });
            }
            let dev = Developer {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                phone: new.phone,
                payment_details: new.payment_details,
                password_hash: new.password_hash,
                created_at: OffsetDateTime::now_utc(),
            };
            developers.insert(dev.id, dev.clone());
            Ok(dev)
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            Ok(self.developers.write().await.remove(&id).is_some())
        }
    }
}
