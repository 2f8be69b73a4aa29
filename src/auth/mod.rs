use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;

pub use extractors::{AdminUser, ClientUser, Principal};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::me_routes())
}
