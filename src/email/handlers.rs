use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{delete, get, post},
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{LogQuery, SentEmail},
    repo_types::{EmailKind, EmailLogEntry},
    services::Attachment,
    templates::escape_html,
};
use crate::{
    api::{ApiResponse, Json},
    auth::{services::is_valid_email, AdminUser},
    error::{AppError, AppResult, FieldError},
    state::AppState,
};

/// Attachments are capped individually; `max_body` bounds the whole upload.
pub fn admin_routes(max_body: usize) -> Router<AppState> {
    Router::new()
        .route("/email/send", post(send_email))
        .layer(DefaultBodyLimit::max(max_body))
        .route("/email/logs", get(list_logs))
        .route("/email/logs/:id", delete(delete_log))
}

#[derive(Default)]
struct EmailForm {
    to: Option<String>,
    subject: Option<String>,
    html: Option<String>,
    message: Option<String>,
    kind: Option<String>,
    related_to: Option<String>,
    attachments: Vec<Attachment>,
}

async fn text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

async fn read_form(mut mp: Multipart, max_file_size: usize) -> AppResult<EmailForm> {
    let mut form = EmailForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "to" => form.to = Some(text(field).await?),
            "subject" => form.subject = Some(text(field).await?),
            "html" => form.html = Some(text(field).await?),
            "message" => form.message = Some(text(field).await?),
            "type" => form.kind = Some(text(field).await?),
            "relatedTo" => form.related_to = Some(text(field).await?),
            "attachments" | "attachments[]" => {
                let filename = field.file_name().unwrap_or("attachment").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                if content.len() > max_file_size {
                    return Err(AppError::BadRequest(format!(
                        "{filename} exceeds the {max_file_size} byte limit"
                    )));
                }
                form.attachments.push(Attachment {
                    filename,
                    content_type,
                    content,
                });
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Plain-text messages become escaped paragraphs.
fn text_to_html(message: &str) -> String {
    message
        .split("\n\n")
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect()
}

#[instrument(skip(state, _admin, mp))]
pub async fn send_email(
    State(state): State<AppState>,
    _admin: AdminUser,
    mp: Multipart,
) -> AppResult<Json<ApiResponse<SentEmail>>> {
    let form = read_form(mp, state.config.max_file_size).await?;

    let mut errors = Vec::new();
    let to = form.to.map(|t| t.trim().to_lowercase()).unwrap_or_default();
    if !is_valid_email(&to) {
        errors.push(FieldError::new("to", "Please provide a valid recipient email"));
    }
    let subject = form.subject.unwrap_or_default();
    if subject.trim().is_empty() {
        errors.push(FieldError::new("subject", "Subject is required"));
    }
    let html = match (form.html, form.message) {
        (Some(html), _) if !html.trim().is_empty() => html,
        (_, Some(message)) if !message.trim().is_empty() => text_to_html(&message),
        _ => {
            errors.push(FieldError::new("message", "Message is required"));
            String::new()
        }
    };
    let kind = match form.kind.as_deref() {
        None | Some("") => EmailKind::Message,
        Some(raw) => match EmailKind::try_from(raw) {
            Ok(kind) => kind,
            Err(_) => {
                errors.push(FieldError::new("type", "Unknown email type"));
                EmailKind::Message
            }
        },
    };
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let attachments = form.attachments.len();
    let mut email = state
        .email
        .compose(&to, subject, html, kind)?
        .with_attachments(form.attachments);
    if let Some(related) = form.related_to.filter(|r| !r.trim().is_empty()) {
        email = email.related_to(related);
    }
    let receipt = state.email.send(&email).await?;
    info!(%to, attachments, "admin email sent");

    Ok(Json(
        ApiResponse::ok(SentEmail {
            id: receipt.id,
            to,
            attachments,
        })
        .with_message("Email sent successfully"),
    ))
}

#[instrument(skip(state, _admin))]
pub async fn list_logs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<LogQuery>,
) -> AppResult<Json<ApiResponse<Vec<EmailLogEntry>>>> {
    let entries = state.email.logs().list(q.limit(), q.offset()).await?;
    Ok(Json(ApiResponse::ok(entries)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_log(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    if !state.email.logs().delete(id).await? {
        return Err(AppError::NotFound("Email log not found".into()));
    }
    Ok(Json(ApiResponse::message("Email log deleted")))
}
