use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which flow a pending code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Signup,
    AdminLogin,
    AccountDeletion,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Signup => "signup",
            Purpose::AdminLogin => "admin_login",
            Purpose::AccountDeletion => "account_deletion",
        }
    }
}

/// What the caller gets back after a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingPayload {
    Signup { name: String, password_hash: String },
    AdminLogin { name: String, password_hash: String },
    AccountDeletion { user_id: Uuid, name: String },
}

impl PendingPayload {
    pub fn purpose(&self) -> Purpose {
        match self {
            PendingPayload::Signup { .. } => Purpose::Signup,
            PendingPayload::AdminLogin { .. } => Purpose::AdminLogin,
            PendingPayload::AccountDeletion { .. } => Purpose::AccountDeletion,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PendingPayload::Signup { name, .. }
            | PendingPayload::AdminLogin { name, .. }
            | PendingPayload::AccountDeletion { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingVerification {
    pub email: String, // one live record per email
    pub payload: PendingPayload,
    pub code_hash: Vec<u8>, // sha256, never the raw code
    pub attempts: i32,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Result of the single find-and-delete step used to check a code.
#[derive(Debug)]
pub enum ConsumeOutcome {
    Consumed(PendingVerification),
    Missing,
    Expired,
    Mismatch { attempts: i32 },
    Locked,
}

#[derive(Debug, FromRow)]
pub(crate) struct PendingRow {
    pub email: String,
    pub purpose: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub user_id: Option<Uuid>,
    pub code_hash: Vec<u8>,
    pub attempts: i32,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl TryFrom<PendingRow> for PendingVerification {
    type Error = anyhow::Error;

    fn try_from(r: PendingRow) -> Result<Self, Self::Error> {
        let payload = match (r.purpose.as_str(), r.password_hash, r.user_id) {
            ("signup", Some(password_hash), _) => PendingPayload::Signup {
                name: r.name,
                password_hash,
            },
            ("admin_login", Some(password_hash), _) => PendingPayload::AdminLogin {
                name: r.name,
                password_hash,
            },
            ("account_deletion", _, Some(user_id)) => PendingPayload::AccountDeletion {
                user_id,
                name: r.name,
            },
            (purpose, _, _) => anyhow::bail!("malformed pending verification for purpose {purpose:?}"),
        };
        Ok(Self {
            email: r.email,
            payload,
            code_hash: r.code_hash,
            attempts: r.attempts,
            expires_at: r.expires_at,
            created_at: r.created_at,
        })
    }
}
