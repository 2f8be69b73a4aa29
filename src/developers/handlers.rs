use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateDeveloperRequest, SigninOutcome, SigninRequest, VerifyAdminRequest},
    repo_types::{Developer, NewDeveloper},
};
use crate::{
    api::{ApiResponse, Json},
    auth::{
        claims::Role,
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        services::{check_account_fields, normalize_email},
        AdminUser,
    },
    clients::{dto::ClientAuth, repo_types::NewUser},
    error::{AppError, AppResult},
    state::AppState,
    verification::repo_types::{PendingPayload, Purpose},
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/developers/signin", post(signin))
        .route("/developers/verify-admin", post(verify_admin))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/developers", get(list_developers).post(create_developer))
        .route("/developers/:id", delete(delete_developer))
}

/// Developer sign in. The configured override pair instead mails an admin code.
#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> AppResult<Json<ApiResponse<SigninOutcome>>> {
    let email = normalize_email(&payload.email);
    let errors = check_account_fields(None, &email, &payload.password, false);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if let Some(admin) = &state.config.admin_override {
        if admin.email == email
            && verify_password_blocking(payload.password.clone(), admin.password_hash.clone()).await?
        {
            let password_hash = admin.password_hash.clone();
            state
                .verification
                .request_code(
                    &email,
                    PendingPayload::AdminLogin {
                        name: "Admin".into(),
                        password_hash,
                    },
                )
                .await?;
            info!("admin escalation code issued");
            return Ok(Json(
                ApiResponse::ok(SigninOutcome::AdminVerificationRequired {
                    requires_verification: true,
                    email,
                })
                .with_message("Verification code sent to admin email"),
            ));
        }
    }

    let Some(developer) = state.developers.find_by_email(&email).await? else {
        warn!(%email, "developer signin unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password_blocking(payload.password, developer.password_hash.clone()).await? {
        warn!(developer_id = %developer.id, "developer signin wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(&state).issue(developer.id, &developer.email, Role::Developer)?;
    info!(developer_id = %developer.id, "developer signed in");
    Ok(Json(ApiResponse::ok(SigninOutcome::Developer { token, developer })))
}

/// Completes admin escalation: upgrades the user with that email, or creates one.
#[instrument(skip(state, payload))]
pub async fn verify_admin(
    State(state): State<AppState>,
    Json(payload): Json<VerifyAdminRequest>,
) -> AppResult<Json<ApiResponse<ClientAuth>>> {
    let email = normalize_email(&payload.email);
    let PendingPayload::AdminLogin { name, password_hash } = state
        .verification
        .verify_code(&email, Purpose::AdminLogin, &payload.code)
        .await?
    else {
        return Err(AppError::BadRequest("No pending verification request found".into()));
    };

    let user = match state.users.find_by_email(&email).await? {
        Some(user) if user.role == Role::Admin => user,
        Some(user) => state
            .users
            .set_role(user.id, Role::Admin)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?,
        None => {
            state
                .users
                .create(NewUser {
                    name,
                    email,
                    password_hash,
                    role: Role::Admin,
                })
                .await?
        }
    };

    let token = JwtKeys::from_ref(&state).issue(user.id, &user.email, Role::Admin)?;
    info!(user_id = %user.id, "admin session issued");
    Ok(Json(ApiResponse::ok(ClientAuth { token, user })))
}

#[instrument(skip(state, _admin))]
pub async fn list_developers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<Developer>>>> {
    Ok(Json(ApiResponse::ok(state.developers.list().await?)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_developer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateDeveloperRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Developer>>)> {
    let email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();
    let errors = check_account_fields(Some(&name), &email, &payload.password, true);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let developer = state
        .developers
        .create(NewDeveloper {
            name,
            email,
            phone: payload.phone,
            payment_details: payload.payment_details,
            password_hash,
        })
        .await?;
    info!(developer_id = %developer.id, "developer created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(developer))))
}

#[instrument(skip(state, _admin))]
pub async fn delete_developer(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    if !state.developers.delete(id).await? {
        return Err(AppError::NotFound("Developer not found".into()));
    }
    info!(developer_id = %id, "developer deleted");
    Ok(Json(ApiResponse::message("Developer deleted")))
}
