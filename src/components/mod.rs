use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod repo_types;

/// Everything mounted under `/api/ui-components`.
pub fn router() -> Router<AppState> {
    handlers::routes()
}
