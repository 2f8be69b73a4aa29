use anyhow::Context;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileUpdate, User, UserRow};
use crate::{auth::claims::Role, db::is_unique_violation, error::StoreError};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>>;
    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, phone, company, created_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(row) => Ok(User::try_from(row)?),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate { field: "email" }),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   phone = COALESCE($3, phone),
                   company = COALESCE($4, company)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.phone)
        .bind(update.company)
        .fetch_optional(&self.db)
        .await
        .context("update user profile")?;
        row.map(User::try_from).transpose()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.db)
        .await
        .context("set user role")?;
        row.map(User::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
pub use memory::InMemoryUserStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;

    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryUserStore {
        users: RwLock<HashMap<Uuid, User>>,
    }

    #[async_trait]
    impl UserStore for InMemoryUserStore {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .read()
                .await
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn create(&self, new: NewUser) -> Result<User, StoreError> {
            let mut users = self.users.write().await;
            if users.values().any(|u| u.email == new.email) {
                return Err(StoreError::Duplicate { field: "email" });
            }
            let user = User {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                role: new.role,
                phone: None,
                company: None,
                created_at: OffsetDateTime::now_utc(),
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> anyhow::Result<Option<User>> {
            let mut users = self.users.write().await;
            let Some(user) = users.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                user.name = name;
            }
            if let Some(phone) = update.phone {
                user.phone = Some(phone);
            }
            if let Some(company) = update.company {
                user.company = Some(company);
            }
            Ok(Some(user.clone()))
        }

        async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
            let mut users = self.users.write().await;
            Ok(users.get_mut(&id).map(|u| {
                u.role = role;
                u.clone()
            }))
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            Ok(self.users.write().await.remove(&id).is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn in_memory_store_enforces_unique_email() {
        let store = InMemoryUserStore::default();
        store.create(new_user("ada@example.com")).await.unwrap();
        let err = store.create(new_user("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn profile_update_keeps_untouched_fields() {
        let store = InMemoryUserStore::default();
        let user = store.create(new_user("ada@example.com")).await.unwrap();
        let updated = store
            .update_profile(
                user.id,
                ProfileUpdate {
                    company: Some("Analytical Engines".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.company.as_deref(), Some("Analytical Engines"));

        let promoted = store.set_role(user.id, Role::Admin).await.unwrap().unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(store.delete(user.id).await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
    }
}
