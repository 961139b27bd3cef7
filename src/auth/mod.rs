use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod google;
pub mod handlers;
pub mod otp;
pub mod repo_types;
pub mod services;

/// Everything mounted under `/api/auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::oauth_routes())
}
