use std::sync::Arc;

use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::{
    repo::PendingStore,
    repo_types::{ConsumeOutcome, PendingPayload, PendingVerification, Purpose},
};
use crate::{
    email::{
        repo_types::EmailKind,
        services::{EmailError, EmailService},
        templates,
    },
    error::AppError,
};

pub const MAX_CODE_ATTEMPTS: i32 = 5;

pub fn default_code_ttl() -> Duration {
    Duration::minutes(15)
}

/// Six digits, uniform over 000000..=999999.
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Codes are stored as sha256("email:code").
pub fn hash_code(email: &str, code: &str) -> Vec<u8> {
    Sha256::digest(format!("{email}:{code}").as_bytes()).to_vec()
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("No pending verification request found")]
    NotFound,
    #[error("Verification code has expired. Please request a new one.")]
    Expired,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Too many failed attempts. Please request a new code.")]
    Locked,
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<VerificationError> for AppError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::Email(e) => e.into(),
            VerificationError::Store(e) => AppError::Internal(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

pub struct VerificationService {
    store: Arc<dyn PendingStore>,
    email: Arc<EmailService>,
    ttl: Duration,
}

impl VerificationService {
    pub fn new(store: Arc<dyn PendingStore>, email: Arc<EmailService>) -> Self {
        Self {
            store,
            email,
            ttl: default_code_ttl(),
        }
    }

    /// Replaces any pending record for `email` and mails a fresh code to it.
    /// The record is removed again when the code cannot be delivered.
    pub async fn request_code(&self, email: &str, payload: PendingPayload) -> Result<(), VerificationError> {
        let purpose = payload.purpose();
        let code = generate_code();
        let rendered = templates::verification_code(payload.name(), &code, purpose);
        let message = self
            .email
            .compose(email, rendered.subject, rendered.html, EmailKind::Notification)?;

        let now = OffsetDateTime::now_utc();
        let code_hash = hash_code(email, &code);
        self.store
            .upsert(PendingVerification {
                email: email.to_string(),
                payload,
                code_hash: code_hash.clone(),
                attempts: 0,
                expires_at: now + self.ttl,
                created_at: now,
            })
            .await?;

        if let Err(e) = self.email.send(&message).await {
            warn!(%email, purpose = purpose.as_str(), error = %e, "verification email not delivered; dropping pending record");
            self.store.remove_issued(email, &code_hash).await?;
            return Err(e.into());
        }
        info!(%email, purpose = purpose.as_str(), "verification code issued");
        Ok(())
    }

    pub async fn verify_code(
        &self,
        email: &str,
        purpose: Purpose,
        code: &str,
    ) -> Result<PendingPayload, VerificationError> {
        self.verify_code_at(email, purpose, code, OffsetDateTime::now_utc())
            .await
    }

    pub async fn verify_code_at(
        &self,
        email: &str,
        purpose: Purpose,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<PendingPayload, VerificationError> {
        let hash = hash_code(email, code.trim());
        match self
            .store
            .consume(email, purpose, &hash, now, MAX_CODE_ATTEMPTS)
            .await?
        {
            ConsumeOutcome::Consumed(record) => {
                info!(%email, purpose = purpose.as_str(), "verification code accepted");
                Ok(record.payload)
            }
            ConsumeOutcome::Missing => Err(VerificationError::NotFound),
            ConsumeOutcome::Expired => Err(VerificationError::Expired),
            ConsumeOutcome::Mismatch { attempts } => {
                warn!(%email, purpose = purpose.as_str(), attempts, "wrong verification code");
                Err(VerificationError::InvalidCode)
            }
            ConsumeOutcome::Locked => {
                warn!(%email, purpose = purpose.as_str(), "verification locked after repeated failures");
                Err(VerificationError::Locked)
            }
        }
    }

    #[cfg(test)]
    pub async fn pending(&self, email: &str) -> anyhow::Result<Option<PendingVerification>> {
        self.store.find(email, OffsetDateTime::now_utc()).await
    }

    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        self.store.purge_expired(OffsetDateTime::now_utc()).await
    }
}
