use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::coupons::{CouponValidation, ValidateCouponRequest},
    error::AppResult,
    response::ApiResponse,
    services::coupon_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/validate", post(validate_coupon))
}

#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon applies", body = ApiResponse<CouponValidation>),
        (status = 400, description = "Inactive, expired or below the minimum amount"),
        (status = 404, description = "Unknown code"),
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCouponRequest>,
) -> AppResult<Json<ApiResponse<CouponValidation>>> {
    let resp = coupon_service::validate_coupon(&state, payload).await?;
    Ok(Json(resp))
}
