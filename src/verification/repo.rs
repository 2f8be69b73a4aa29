use anyhow::Context;
use axum::async_trait;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;

use super::repo_types::{ConsumeOutcome, PendingPayload, PendingRow, PendingVerification, Purpose};

#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Inserts `record`, replacing any record for the same email.
    async fn upsert(&self, record: PendingVerification) -> anyhow::Result<()>;
    /// Live record for `email`; expired records read as absent.
    #[cfg(test)]
    async fn find(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<Option<PendingVerification>>;
    /// Removes the record for `email` only while it still holds `code_hash`,
    /// so a newer code issued in the meantime survives.
    async fn remove_issued(&self, email: &str, code_hash: &[u8]) -> anyhow::Result<bool>;
    /// Deletes and returns the record only if purpose, hash and expiry all match.
    /// Otherwise classifies the miss, bumping `attempts` on a wrong code and
    /// dropping the record once `max_attempts` is reached.
    async fn consume(
        &self,
        email: &str,
        purpose: Purpose,
        code_hash: &[u8],
        now: OffsetDateTime,
        max_attempts: i32,
    ) -> anyhow::Result<ConsumeOutcome>;
    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

const PENDING_COLUMNS: &str =
    "email, purpose, name, password_hash, user_id, code_hash, attempts, expires_at, created_at";

pub struct PgPendingStore {
    db: PgPool,
}

impl PgPendingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PendingStore for PgPendingStore {
    async fn upsert(&self, record: PendingVerification) -> anyhow::Result<()> {
        let (password_hash, user_id) = match &record.payload {
            PendingPayload::Signup { password_hash, .. }
            | PendingPayload::AdminLogin { password_hash, .. } => (Some(password_hash.as_str()), None),
            PendingPayload::AccountDeletion { user_id, .. } => (None, Some(*user_id)),
        };
        sqlx::query(
            r#"
            INSERT INTO pending_verifications
                (email, purpose, name, password_hash, user_id, code_hash, attempts, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8)
            ON CONFLICT (email) DO UPDATE
               SET purpose = EXCLUDED.purpose,
                   name = EXCLUDED.name,
                   password_hash = EXCLUDED.password_hash,
                   user_id = EXCLUDED.user_id,
                   code_hash = EXCLUDED.code_hash,
                   attempts = 0,
                   expires_at = EXCLUDED.expires_at,
                   created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&record.email)
        .bind(record.payload.purpose().as_str())
        .bind(record.payload.name())
        .bind(password_hash)
        .bind(user_id)
        .bind(&record.code_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.db)
        .await
        .context("upsert pending verification")?;
        Ok(())
    }

    #[cfg(test)]
    async fn find(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<Option<PendingVerification>> {
        let row = sqlx::query_as::<_, PendingRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_verifications WHERE email = $1 AND expires_at >= $2"
        ))
        .bind(email)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find pending verification")?;
        row.map(PendingVerification::try_from).transpose()
    }

    async fn remove_issued(&self, email: &str, code_hash: &[u8]) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM pending_verifications WHERE email = $1 AND code_hash = $2")
            .bind(email)
            .bind(code_hash)
            .execute(&self.db)
            .await
            .context("delete pending verification")?;
        Ok(res.rows_affected() > 0)
    }

    async fn consume(
        &self,
        email: &str,
        purpose: Purpose,
        code_hash: &[u8],
        now: OffsetDateTime,
        max_attempts: i32,
    ) -> anyhow::Result<ConsumeOutcome> {
        let consumed = sqlx::query_as::<_, PendingRow>(&format!(
            r#"
            DELETE FROM pending_verifications
             WHERE email = $1 AND purpose = $2 AND code_hash = $3 AND expires_at >= $4
            RETURNING {PENDING_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("consume pending verification")?;
        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(row.try_into()?));
        }

        let existing = sqlx::query(
            "SELECT expires_at FROM pending_verifications WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.db)
        .await
        .context("inspect pending verification")?;
        let Some(existing) = existing else {
            return Ok(ConsumeOutcome::Missing);
        };

        let expires_at: OffsetDateTime = existing.get("expires_at");
        if now > expires_at {
            sqlx::query("DELETE FROM pending_verifications WHERE email = $1 AND expires_at < $2")
                .bind(email)
                .bind(now)
                .execute(&self.db)
                .await
                .context("delete expired verification")?;
            return Ok(ConsumeOutcome::Expired);
        }

        let bumped = sqlx::query(
            r#"
            UPDATE pending_verifications
               SET attempts = attempts + 1
             WHERE email = $1 AND purpose = $2
            RETURNING attempts
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .fetch_optional(&self.db)
        .await
        .context("count failed verification attempt")?;
        let Some(bumped) = bumped else {
            return Ok(ConsumeOutcome::Missing);
        };

        let attempts: i32 = bumped.get("attempts");
        if attempts >= max_attempts {
            sqlx::query("DELETE FROM pending_verifications WHERE email = $1 AND attempts >= $2")
                .bind(email)
                .bind(max_attempts)
                .execute(&self.db)
                .await
                .context("drop locked verification")?;
            return Ok(ConsumeOutcome::Locked);
        }
        Ok(ConsumeOutcome::Mismatch { attempts })
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM pending_verifications WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("purge expired verifications")?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
pub use memory::InMemoryPendingStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryPendingStore {
        records: Mutex<HashMap<String, PendingVerification>>,
    }

    #[async_trait]
    impl PendingStore for InMemoryPendingStore {
        async fn upsert(&self, record: PendingVerification) -> anyhow::Result<()> {
            self.records.lock().await.insert(record.email.clone(), record);
            Ok(())
        }

        async fn find(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<Option<PendingVerification>> {
            Ok(self
                .records
                .lock()
                .await
                .get(email)
                .filter(|r| r.expires_at >= now)
                .cloned())
        }

        async fn remove_issued(&self, email: &str, code_hash: &[u8]) -> anyhow::Result<bool> {
            let mut records = self.records.lock().await;
            if records.get(email).is_some_and(|r| r.code_hash == code_hash) {
                records.remove(email);
                return Ok(true);
            }
            Ok(false)
        }

        async fn consume(
            &self,
            email: &str,
            purpose: Purpose,
            code_hash: &[u8],
            now: OffsetDateTime,
            max_attempts: i32,
        ) -> anyhow::Result<ConsumeOutcome> {
            let mut records = self.records.lock().await;
            let Some(record) = records.get_mut(email) else {
                return Ok(ConsumeOutcome::Missing);
            };
            if record.payload.purpose() != purpose {
                return Ok(ConsumeOutcome::Missing);
            }
            if now > record.expires_at {
                records.remove(email);
                return Ok(ConsumeOutcome::Expired);
            }
            if record.code_hash != code_hash {
                record.attempts += 1;
                let attempts = record.attempts;
                if attempts >= max_attempts {
                    records.remove(email);
                    return Ok(ConsumeOutcome::Locked);
                }
                return Ok(ConsumeOutcome::Mismatch { attempts });
            }
            match records.remove(email) {
                Some(record) => Ok(ConsumeOutcome::Consumed(record)),
                None => Ok(ConsumeOutcome::Missing),
            }
        }

        async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
            let mut records = self.records.lock().await;
            let before = records.len();
            records.retain(|_, r| r.expires_at >= now);
            Ok((before - records.len()) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn record(email: &str, code_hash: &[u8]) -> PendingVerification {
        let now = OffsetDateTime::now_utc();
        PendingVerification {
            email: email.to_string(),
            payload: PendingPayload::Signup {
                name: "Ada".into(),
                password_hash: "$argon2id$stub".into(),
            },
            code_hash: code_hash.to_vec(),
            attempts: 0,
            expires_at: now + Duration::minutes(15),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn rollback_leaves_a_newer_code_in_place() {
        let store = InMemoryPendingStore::default();
        let email = "client@example.com";
        store.upsert(record(email, b"first")).await.unwrap();
        store.upsert(record(email, b"second")).await.unwrap();

        assert!(!store.remove_issued(email, b"first").await.unwrap());
        let live = store.find(email, OffsetDateTime::now_utc()).await.unwrap().unwrap();
        assert_eq!(live.code_hash, b"second".to_vec());

        assert!(store.remove_issued(email, b"second").await.unwrap());
        assert!(store.find(email, OffsetDateTime::now_utc()).await.unwrap().is_none());
    }
}
