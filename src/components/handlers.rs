use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        CreateComponentRequest, DeletedResponse, LikeRequest, ListParams, ListResponse,
        UpdateComponentRequest,
    },
    repo_types::{
        clean_tags, total_pages, Category, ComponentPatch, ComponentQuery, NewComponent,
        UiComponent,
    },
};
use crate::{error::AppError, state::AppState};

const DEFAULT_LIMIT: u32 = 12;
const MAX_LIMIT: u32 = 100;
const MEMORY_NOTICE: &str = "Using local storage - components will be lost on server restart";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_components).post(create_component))
        .route(
            "/:id",
            get(get_component)
                .put(update_component)
                .delete(delete_component),
        )
        .route("/:id/like", post(toggle_like))
        .route("/:id/download", post(record_download))
}

// --- request normalization ---

fn lenient_u32(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v.clamp(1, i64::from(u32::MAX)) as u32)
        .unwrap_or(default)
}

fn parse_category(raw: &str) -> Result<Category, AppError> {
    raw.trim()
        .parse::<Category>()
        .map_err(|e| AppError::bad_request(e.to_string()))
}

/// `None` when the category filter names no known category, so nothing can match.
fn list_query(params: ListParams) -> Option<ComponentQuery> {
    let category = match params.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<Category>().ok()? {
            Category::All => None,
            c => Some(c),
        },
    };
    Some(ComponentQuery {
        category,
        search: params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        page: lenient_u32(params.page.as_deref(), 1),
        limit: lenient_u32(params.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT),
    })
}

/// Unparseable identifiers cannot exist, so they are reported as not found.
fn component_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse().map_err(|_| not_found())
}

fn not_found() -> AppError {
    AppError::NotFound("Component not found".into())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_components(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let message = (!state.backend.is_persistent()).then(|| MEMORY_NOTICE.to_string());
    let Some(query) = list_query(params) else {
        return Ok(Json(ListResponse {
            components: Vec::new(),
            total_pages: 0,
            current_page: 1,
            total: 0,
            message,
        }));
    };
    let page = state
        .components
        .list(&query)
        .await
        .map_err(|e| AppError::internal("Error fetching components", e))?;

    Ok(Json(ListResponse {
        total_pages: total_pages(page.total, query.limit),
        current_page: query.page,
        total: page.total,
        components: page.items,
        message,
    }))
}

#[instrument(skip(state))]
pub async fn get_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UiComponent>, AppError> {
    let id = component_id(&id)?;
    state
        .components
        .get(id)
        .await
        .map_err(|e| AppError::internal("Error fetching component", e))?
        .map(Json)
        .ok_or_else(not_found)
}

#[instrument(skip(state, payload))]
pub async fn create_component(
    State(state): State<AppState>,
    Json(payload): Json<CreateComponentRequest>,
) -> Result<(StatusCode, Json<UiComponent>), AppError> {
    let (Some(title), Some(category), Some(code)) = (
        non_blank(payload.title),
        non_blank(payload.category),
        payload.code.filter(|c| !c.html.trim().is_empty()),
    ) else {
        return Err(AppError::bad_request("Title, category, and code are required"));
    };
    let category = parse_category(&category)?;

    let mut new = NewComponent::new(category, code);
    new.title = Some(title);
    new.description = non_blank(payload.description);
    new.preview = payload.preview;
    new.tags = clean_tags(payload.tags.unwrap_or_default());
    new.author = non_blank(payload.author_id);
    new.is_public = payload.is_public.unwrap_or(true);

    let component = state
        .components
        .create(new)
        .await
        .map_err(|e| AppError::internal("Error creating component", e))?;

    info!(component_id = %component.id, title = %component.title, "component created");
    Ok((StatusCode::CREATED, Json(component)))
}

#[instrument(skip(state, payload))]
pub async fn update_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateComponentRequest>,
) -> Result<Json<UiComponent>, AppError> {
    let id = component_id(&id)?;
    let category = match payload.category.as_deref() {
        Some(raw) => Some(parse_category(raw)?),
        None => None,
    };
    let patch = ComponentPatch {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description.map(|d| d.trim().to_string()),
        category,
        code: payload.code,
        preview: payload.preview,
        tags: payload.tags.map(clean_tags),
        is_public: payload.is_public,
    };

    state
        .components
        .update(id, patch)
        .await
        .map_err(|e| AppError::internal("Error updating component", e))?
        .map(Json)
        .ok_or_else(not_found)
}

#[instrument(skip(state))]
pub async fn delete_component(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let id = component_id(&id)?;
    let deleted = state
        .components
        .delete(id)
        .await
        .map_err(|e| AppError::internal("Error deleting component", e))?;
    if !deleted {
        return Err(not_found());
    }
    info!(component_id = %id, "component deleted");
    Ok(Json(DeletedResponse {
        message: "Component deleted successfully".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<LikeRequest>,
) -> Result<Json<UiComponent>, AppError> {
    let id = component_id(&id)?;
    let user_id =
        non_blank(payload.user_id).ok_or_else(|| AppError::bad_request("userId is required"))?;
    state
        .components
        .toggle_like(id, &user_id)
        .await
        .map_err(|e| AppError::internal("Error updating likes", e))?
        .map(Json)
        .ok_or_else(not_found)
}

#[instrument(skip(state))]
pub async fn record_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UiComponent>, AppError> {
    let id = component_id(&id)?;
    state
        .components
        .increment_downloads(id)
        .await
        .map_err(|e| AppError::internal("Error updating downloads", e))?
        .map(Json)
        .ok_or_else(not_found)
}
