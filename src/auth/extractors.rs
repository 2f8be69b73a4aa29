use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{claims::Role, jwt::JwtKeys};
use crate::{clients::repo_types::User, developers::repo_types::Developer, error::AppError, state::AppState};

/// Authenticated caller, resolved from the bearer token against the store
/// matching the token's role.
#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    Developer(Developer),
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalSummary {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::User(u) => u.id,
            Principal::Developer(d) => d.id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Principal::User(u) => &u.email,
            Principal::Developer(d) => &d.email,
        }
    }

    /// Role as currently stored, not as claimed by the token.
    pub fn role(&self) -> Role {
        match self {
            Principal::User(u) => u.role,
            Principal::Developer(_) => Role::Developer,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Principal::User(u) => &u.name,
            Principal::Developer(d) => &d.name,
        }
    }

    pub fn summary(&self) -> PrincipalSummary {
        PrincipalSummary {
            id: self.id(),
            email: self.email().to_string(),
            role: self.role(),
            name: self.name().to_string(),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })?;

        let principal = match claims.role {
            Role::Developer => state
                .developers
                .find_by_id(claims.sub)
                .await?
                .map(Principal::Developer),
            Role::User | Role::Admin => state.users.find_by_id(claims.sub).await?.map(Principal::User),
        };
        principal.ok_or_else(|| {
            debug!(principal_id = %claims.sub, role = %claims.role, "token principal no longer exists");
            AppError::Unauthorized
        })
    }
}

/// A client user holding the admin role.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::User(user) if user.role == Role::Admin => Ok(AdminUser(user)),
            _ => Err(AppError::Forbidden),
        }
    }
}

/// Any client user (admins included); developers are refused.
pub struct ClientUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for ClientUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::User(user) => Ok(ClientUser(user)),
            Principal::Developer(_) => Err(AppError::Forbidden),
        }
    }
}
