use axum::{extract::State, http::StatusCode, routing::post, Router};
use tracing::{info, instrument, warn};

use super::{
    dto::ContactRequest,
    repo_types::{ContactMessage, NewContactMessage},
};
use crate::{
    api::{ApiResponse, Json},
    auth::{
        services::{is_valid_email, normalize_email},
        AdminUser,
    },
    email::{repo_types::EmailKind, templates, EmailError},
    error::{AppError, AppResult, FieldError},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/messages", post(create_message).get(list_messages))
}

/// Saves the message first; the admin notice is best effort and its
/// outcome is reported as `emailSent`.
#[instrument(skip(state, payload))]
pub async fn create_message(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ContactMessage>>)> {
    let name = payload.name.trim().to_string();
    let email = normalize_email(&payload.email);
    let message = payload.message.trim().to_string();
    let subject = payload
        .subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if message.is_empty() {
        errors.push(FieldError::new("message", "Message is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let saved = state
        .messages
        .create(NewContactMessage {
            name,
            email,
            subject,
            message,
        })
        .await?;

    let email_sent = match notify_admin(&state, &saved).await {
        Ok(()) => true,
        Err(e) => {
            warn!(message_id = %saved.id, error = %e, "contact notice not sent");
            false
        }
    };
    info!(message_id = %saved.id, email_sent, "contact message saved");

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(saved)
                .with_message("Message sent successfully")
                .with_email_sent(email_sent),
        ),
    ))
}

async fn notify_admin(state: &AppState, msg: &ContactMessage) -> Result<(), EmailError> {
    let Some(admin) = state.config.email.admin_email.as_deref() else {
        return Err(EmailError::NotConfigured);
    };
    let rendered = templates::contact_notice(&msg.name, &msg.email, msg.subject.as_deref(), &msg.message);
    let mut email = state
        .email
        .compose(admin, rendered.subject, rendered.html, EmailKind::Message)?
        .related_to(msg.id.to_string());
    email.headers.push(("Reply-To".into(), msg.email.clone()));
    state.email.send(&email).await.map(|_| ())
}

#[instrument(skip(state, _admin))]
pub async fn list_messages(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<ContactMessage>>>> {
    Ok(Json(ApiResponse::ok(state.messages.list().await?)))
}
