//! HTTP surface for the inbound blog API and the catalog pull API.
//!
//! Endpoints (all require the API key header):
//! - GET  /V1/requestdesk/external/blog/test
//! - POST /V1/requestdesk/external/blog/posts
//! - GET  /V1/requestdesk/external/blog/posts?page&per_page&status
//! - GET|PUT|DELETE /V1/requestdesk/external/blog/posts/:post_id
//! - GET  /V1/requestdesk/test
//! - GET  /V1/requestdesk/products?page_size&current_page
//! - GET  /V1/requestdesk/categories
//! - GET  /V1/requestdesk/cms-pages?page_size&current_page

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::blog::{failure_body, CreatePostRequest, ExternalBlog, UpdatePostRequest, KEY_HEADERS};
use crate::error::SyncError;
use crate::export::DataExport;

#[derive(Debug, Clone)]
pub struct AppState {
    pub blog: ExternalBlog,
    pub export: DataExport,
}

/// Error wrapper turning [`SyncError`] into a `{success: false, error}` reply.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Authentication(_) => StatusCode::UNAUTHORIZED,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(err = %self.0, "request failed");
        }
        (status, Json(failure_body(&self.0))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn provided_key(headers: &HeaderMap) -> Option<&str> {
    KEY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    state.blog.authenticate(provided_key(headers))?;
    Ok(())
}

/// Bodies are decoded after the key check so an unauthenticated caller
/// always sees 401.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError(SyncError::Validation(rejection.body_text())))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    #[serde(alias = "pageSize")]
    page_size: Option<u32>,
    #[serde(alias = "currentPage")]
    current_page: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/V1/requestdesk/external/blog/test", get(blog_test))
        .route(
            "/V1/requestdesk/external/blog/posts",
            get(list_posts).post(create_post),
        )
        .route(
            "/V1/requestdesk/external/blog/posts/:post_id",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/V1/requestdesk/test", get(export_test))
        .route("/V1/requestdesk/products", get(products))
        .route("/V1/requestdesk/categories", get(categories))
        .route("/V1/requestdesk/cms-pages", get(cms_pages))
        .with_state(state)
}

async fn blog_test(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.blog.test()))
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let req = body(payload)?;
    Ok(Json(state.blog.create(&req).await?))
}

async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(
        state
            .blog
            .list(q.page, q.per_page, q.status.as_deref())
            .await?,
    ))
}

async fn get_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.blog.get(&post_id).await?))
}

async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    payload: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let req = body(payload)?;
    Ok(Json(state.blog.update(&post_id, &req).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.blog.delete(&post_id).await?))
}

async fn export_test(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.export.test_connection()))
}

async fn products(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.export.products(q.page_size, q.current_page).await?))
}

async fn categories(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.export.categories().await?))
}

async fn cms_pages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PageQuery>,
) -> ApiResult {
    authorize(&state, &headers)?;
    Ok(Json(state.export.cms_pages(q.page_size, q.current_page).await?))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(%err, "failed to listen for Ctrl+C");
    }
}
