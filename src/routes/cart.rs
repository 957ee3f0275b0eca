use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};

use crate::{
    dto::cart::{AddToCartRequest, CartSummary, ClearCartResult, UpdateCartItemRequest},
    error::AppResult,
    models::CartItem,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items/{id}", put(update_cart_item).delete(remove_cart_item))
        .route("/{session_id}", get(get_cart).delete(clear_cart))
        .route("/{session_id}/items", post(add_to_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart/{session_id}",
    params(
        ("session_id" = String, Path, description = "Anonymous cart session")
    ),
    responses(
        (status = 200, description = "Cart lines with live prices", body = ApiResponse<CartSummary>),
        (status = 400, description = "Invalid session"),
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<ApiResponse<CartSummary>>> {
    let resp = cart_service::get_cart(&state, &session_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/{session_id}/items",
    params(
        ("session_id" = String, Path, description = "Anonymous cart session")
    ),
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add or merge cart line", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid quantity, discontinued product or insufficient stock"),
        (status = 404, description = "Product or variant not found"),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::add_item(&state, &session_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/items/{id}",
    params(
        ("id" = i64, Path, description = "Cart item ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity replaced", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid quantity or insufficient stock"),
        (status = 404, description = "Cart item not found"),
    ),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::update_item(&state, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{id}",
    params(
        ("id" = i64, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "OK", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Cart item not found"),
    ),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::remove_item(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{session_id}",
    params(
        ("session_id" = String, Path, description = "Anonymous cart session")
    ),
    responses(
        (status = 200, description = "All lines removed", body = ApiResponse<ClearCartResult>),
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<ApiResponse<ClearCartResult>>> {
    let resp = cart_service::clear_cart(&state, &session_id).await?;
    Ok(Json(resp))
}
