use axum::{routing::get, Router};
use tracing::instrument;

use super::extractors::{Principal, PrincipalSummary};
use crate::{
    api::{ApiResponse, Json},
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(principal), fields(principal_id = %principal.id()))]
pub async fn get_me(principal: Principal) -> Json<ApiResponse<PrincipalSummary>> {
    Json(ApiResponse::ok(principal.summary()))
}
