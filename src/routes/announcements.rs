use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::admin::AnnouncementList,
    error::AppResult,
    response::ApiResponse,
    services::announcement_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_announcements))
}

#[utoipa::path(
    get,
    path = "/api/announcements",
    responses(
        (status = 200, description = "Active announcements by sort order", body = ApiResponse<AnnouncementList>)
    ),
    tag = "Announcements"
)]
pub async fn list_announcements(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<AnnouncementList>>> {
    let resp = announcement_service::list_active(&state).await?;
    Ok(Json(resp))
}
