use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{ClientAuth, DeletionCodeRequest, ProfileRequest, SigninRequest, SignupRequest, VerifyRequest},
    repo_types::{NewUser, ProfileUpdate, User},
};
use crate::{
    api::{ApiResponse, Json},
    auth::{
        claims::Role,
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        services::{check_account_fields, normalize_email},
        ClientUser,
    },
    error::{AppError, AppResult, FieldError},
    state::AppState,
    verification::repo_types::{PendingPayload, Purpose},
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/clients/request-verification", post(request_verification))
        .route("/clients/verify", post(verify))
        .route("/clients/signin", post(signin))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/clients/profile", get(get_profile).put(update_profile))
        .route("/clients/request-deletion", post(request_deletion))
        .route("/clients/verify-deletion", post(verify_deletion))
}

#[instrument(skip(state, payload))]
pub async fn request_verification(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();
    let errors = check_account_fields(Some(&name), &email, &payload.password, true);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "signup for registered email");
        return Err(AppError::Duplicate { field: "email" });
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    state
        .verification
        .request_code(&email, PendingPayload::Signup { name, password_hash })
        .await?;

    Ok(Json(ApiResponse::message(
        "Verification code sent to your email",
    )))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> AppResult<Json<ApiResponse<ClientAuth>>> {
    let email = normalize_email(&payload.email);
    if payload.code.trim().is_empty() {
        return Err(AppError::Validation(vec![FieldError::new(
            "code",
            "Verification code is required",
        )]));
    }

    let PendingPayload::Signup { name, password_hash } = state
        .verification
        .verify_code(&email, Purpose::Signup, &payload.code)
        .await?
    else {
        return Err(AppError::BadRequest("No pending verification request found".into()));
    };

    let user = state
        .users
        .create(NewUser {
            name,
            email,
            password_hash,
            role: Role::User,
        })
        .await?;
    let token = JwtKeys::from_ref(&state).issue(user.id, &user.email, user.role)?;
    info!(user_id = %user.id, "client account created");

    Ok(Json(
        ApiResponse::ok(ClientAuth { token, user }).with_message("Account created"),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> AppResult<Json<ApiResponse<ClientAuth>>> {
    let email = normalize_email(&payload.email);
    let errors = check_account_fields(None, &email, &payload.password, false);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "signin unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "signin wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(&state).issue(user.id, &user.email, user.role)?;
    info!(user_id = %user.id, role = %user.role, "client signed in");
    Ok(Json(ApiResponse::ok(ClientAuth { token, user })))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_profile(ClientUser(user): ClientUser) -> Json<ApiResponse<User>> {
    Json(ApiResponse::ok(user))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    ClientUser(user): ClientUser,
    Json(payload): Json<ProfileRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let name = payload.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(AppError::Validation(vec![FieldError::new("name", "Name cannot be empty")]));
    }

    let update = ProfileUpdate {
        name,
        phone: payload.phone.map(|p| p.trim().to_string()),
        company: payload.company.map(|c| c.trim().to_string()),
    };
    let updated = state
        .users
        .update_profile(user.id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(ApiResponse::ok(updated).with_message("Profile updated")))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn request_deletion(
    State(state): State<AppState>,
    ClientUser(user): ClientUser,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .verification
        .request_code(
            &user.email,
            PendingPayload::AccountDeletion {
                user_id: user.id,
                name: user.name.clone(),
            },
        )
        .await?;
    Ok(Json(ApiResponse::message(
        "Deletion code sent to your email",
    )))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn verify_deletion(
    State(state): State<AppState>,
    ClientUser(user): ClientUser,
    Json(payload): Json<DeletionCodeRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let payload = state
        .verification
        .verify_code(&user.email, Purpose::AccountDeletion, &payload.code)
        .await?;
    match payload {
        PendingPayload::AccountDeletion { user_id, .. } if user_id == user.id => {}
        _ => return Err(AppError::BadRequest("No pending verification request found".into())),
    }

    if !state.users.delete(user.id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!("client account deleted");
    Ok(Json(ApiResponse::message("Account deleted")))
}
