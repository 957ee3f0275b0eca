use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::orders::{SubmitOrderRequest, SubmitOrderResponse},
    error::AppResult,
    response::ApiResponse,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/submit", post(submit_order))
}

/// Persists the order, clears the session cart and notifies staff. A failed
/// notification is reported through `telegramSent`, never as an error.
#[utoipa::path(
    post,
    path = "/api/orders/submit",
    request_body = SubmitOrderRequest,
    responses(
        (status = 200, description = "Order stored", body = ApiResponse<SubmitOrderResponse>),
        (status = 400, description = "Missing order data or invalid fields"),
    ),
    tag = "Orders"
)]
pub async fn submit_order(
    State(state): State<AppState>,
    Json(payload): Json<SubmitOrderRequest>,
) -> AppResult<Json<ApiResponse<SubmitOrderResponse>>> {
    let resp = order_service::submit_order(&state, payload).await?;
    Ok(Json(resp))
}
