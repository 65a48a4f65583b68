use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Extension, Json,
};

use crate::error::{ApiResponse, Result};
use crate::models::{CreateLinkRequest, CurrentUser, LinkResponse, LinkStatsResponse};
use crate::services::LinkService;
use crate::AppState;

/// List the caller's links
/// GET /api/v1/links
pub async fn list_links(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<LinkResponse>>>> {
    let links = LinkService::list(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(links)))
}

/// Create a short link
/// POST /api/v1/links
pub async fn create_link(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<impl IntoResponse> {
    let link = LinkService::create(&state.db, &current_user.id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(link))))
}

/// Delete a link
/// DELETE /api/v1/links/:id
pub async fn delete_link(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(link_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    LinkService::delete(&state.db, &current_user.id, &link_id).await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "Link deleted successfully",
    )))
}

/// Click statistics for a link
/// GET /api/v1/links/:id/stats
pub async fn link_stats(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(link_id): Path<String>,
) -> Result<Json<ApiResponse<LinkStatsResponse>>> {
    let stats = LinkService::stats(&state.db, &current_user.id, &link_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Public redirect: counts the click and forwards to the destination
/// GET /r/:short_code
pub async fn redirect(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<Redirect> {
    let destination = LinkService::resolve(&state.db, &short_code).await?;
    Ok(Redirect::temporary(&destination))
}
