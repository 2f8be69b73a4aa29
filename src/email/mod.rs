pub mod dto;
pub mod handlers;
pub mod provider;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod templates;

pub use services::EmailError;

use crate::state::AppState;
use axum::Router;

pub fn router(max_body: usize) -> Router<AppState> {
    Router::new().merge(handlers::admin_routes(max_body))
}
