use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, instrument};

use super::{
    dto::{CreateActivityRequest, CreatedActivity},
    repo_types::{Activity, NewActivity},
};
use crate::{
    api::{ApiResponse, Json},
    auth::{AdminUser, Principal},
    email::{repo_types::EmailKind, templates},
    error::{AppError, AppResult, FieldError},
    notifier::{services::NotificationContent, Recipient},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/activities", get(list_activities).post(create_activity))
}

/// Stores the activity, then queues a paced notice to every developer.
/// The response does not wait for the notices.
#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn create_activity(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(payload): Json<CreateActivityRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreatedActivity>>)> {
    let title = payload.title.trim().to_string();
    let description = payload.description.trim().to_string();
    let mut errors = Vec::new();
    if title.is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    }
    if description.is_empty() {
        errors.push(FieldError::new("description", "Description is required"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let activity = state
        .activities
        .create(NewActivity {
            title,
            description,
            scheduled_for: payload.scheduled_for,
            created_by: Some(admin.0.id),
        })
        .await?;

    let recipients: Vec<Recipient> = state
        .developers
        .list()
        .await?
        .into_iter()
        .map(|d| Recipient {
            email: d.email,
            name: d.name,
        })
        .collect();
    let count = recipients.len();

    let batch_id = if recipients.is_empty() {
        None
    } else {
        let (title, description) = (activity.title.clone(), activity.description.clone());
        let when = activity
            .scheduled_for
            .and_then(|t| t.format(&Rfc3339).ok());
        let build = Arc::new(move |r: &Recipient| {
            let rendered = templates::activity_notice(&r.name, &title, &description, when.as_deref());
            NotificationContent {
                subject: rendered.subject,
                html: rendered.html,
            }
        });
        match state
            .notifier
            .enqueue(
                &format!("activity:{}", activity.id),
                recipients,
                EmailKind::Notification,
                Some(activity.id.to_string()),
                build,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                error!(activity_id = %activity.id, error = %e, "failed to queue activity notifications");
                None
            }
        }
    };
    let queued = if batch_id.is_some() { count } else { 0 };
    info!(activity_id = %activity.id, notifications = queued, "activity created");

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(CreatedActivity {
                activity,
                notifications_queued: queued,
                batch_id,
            })
            .with_message("Activity created"),
        ),
    ))
}

#[instrument(skip(state, principal), fields(principal_id = %principal.id()))]
pub async fn list_activities(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<ApiResponse<Vec<Activity>>>> {
    Ok(Json(ApiResponse::ok(state.activities.list().await?)))
}
