use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post, put},
};

use crate::{
    audit::{self, AuditLogList},
    dto::{
        admin::{
            AdminList, AnnouncementList, CreateAdminRequest, CreateAnnouncementRequest, SettingList,
            UpdateAnnouncementRequest, UpdateSettingRequest,
        },
        coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest},
        orders::{OrderList, OrderWithItems},
        products::{
            CreateProductRequest, LowStockList, NewVariantRequest, StockAdjustRequest,
            UpdateProductRequest, UpdateVariantRequest,
        },
    },
    error::AppResult,
    middleware::auth::AuthAdmin,
    models::{Admin, Announcement, Coupon, Product, ProductVariant, ProductWithVariants, SystemSetting},
    response::ApiResponse,
    routes::params::{LowStockQuery, OrderListQuery, Pagination},
    services::{
        admin_service, announcement_service, coupon_service, order_service, product_service,
        setting_service,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product).delete(delete_product))
        .route("/products/{id}/stock", patch(adjust_stock))
        .route("/products/{id}/variants", post(create_variant))
        .route("/variants/{id}", put(update_variant).delete(delete_variant))
        .route("/variants/{id}/stock", patch(adjust_variant_stock))
        .route("/inventory/low-stock", get(list_low_stock))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/{id}", put(update_coupon).delete(delete_coupon))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route(
            "/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route(
            "/announcements/{id}",
            put(update_announcement).delete(delete_announcement),
        )
        .route("/settings", get(list_settings))
        .route("/settings/{key}", put(upsert_setting))
        .route("/admins", get(list_admins).post(create_admin))
        .route("/admins/{id}", axum::routing::delete(delete_admin))
        .route("/audit-logs", get(list_audit_logs))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 200, description = "Create product with optional variants", body = ApiResponse<ProductWithVariants>),
        (status = 400, description = "Invalid product"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Json(payload): Json<CreateProductRequest>,
) -> AppResult<Json<ApiResponse<ProductWithVariants>>> {
    let resp = product_service::create_product(&state, &admin, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    params(("id" = i64, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ApiResponse<Product>),
        (status = 400, description = "Invalid product"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::update_product(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = i64, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Deleted product and its variants", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_product(&state, &admin, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/products/{id}/stock",
    params(("id" = i64, Path, description = "Product ID")),
    request_body = StockAdjustRequest,
    responses(
        (status = 200, description = "Adjust product stock", body = ApiResponse<Product>),
        (status = 400, description = "Zero delta or stock would go negative"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<StockAdjustRequest>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::adjust_stock(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/products/{id}/variants",
    params(("id" = i64, Path, description = "Product ID")),
    request_body = NewVariantRequest,
    responses(
        (status = 200, description = "Create variant", body = ApiResponse<ProductVariant>),
        (status = 400, description = "Invalid variant"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_variant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<NewVariantRequest>,
) -> AppResult<Json<ApiResponse<ProductVariant>>> {
    let resp = product_service::create_variant(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/variants/{id}",
    params(("id" = i64, Path, description = "Variant ID")),
    request_body = UpdateVariantRequest,
    responses(
        (status = 200, description = "Updated variant", body = ApiResponse<ProductVariant>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_variant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateVariantRequest>,
) -> AppResult<Json<ApiResponse<ProductVariant>>> {
    let resp = product_service::update_variant(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/variants/{id}",
    params(("id" = i64, Path, description = "Variant ID")),
    responses(
        (status = 200, description = "Deleted variant", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_variant(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_variant(&state, &admin, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/variants/{id}/stock",
    params(("id" = i64, Path, description = "Variant ID")),
    request_body = StockAdjustRequest,
    responses(
        (status = 200, description = "Adjust variant stock", body = ApiResponse<ProductVariant>),
        (status = 400, description = "Zero delta or stock would go negative"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_variant_stock(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<StockAdjustRequest>,
) -> AppResult<Json<ApiResponse<ProductVariant>>> {
    let resp = product_service::adjust_variant_stock(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/inventory/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "List low stock products", body = ApiResponse<LowStockList>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    _admin: AuthAdmin,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<ApiResponse<LowStockList>>> {
    let resp = product_service::list_low_stock(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/coupons",
    responses(
        (status = 200, description = "All coupons", body = ApiResponse<CouponList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    _admin: AuthAdmin,
) -> AppResult<Json<ApiResponse<CouponList>>> {
    let resp = coupon_service::list_coupons(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 200, description = "Create coupon", body = ApiResponse<Coupon>),
        (status = 400, description = "Invalid rules or duplicate code"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Json(payload): Json<CreateCouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let resp = coupon_service::create_coupon(&state, &admin, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/coupons/{id}",
    params(("id" = i64, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Updated coupon", body = ApiResponse<Coupon>),
        (status = 400, description = "Invalid rules or duplicate code"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let resp = coupon_service::update_coupon(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/coupons/{id}",
    params(("id" = i64, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Deleted coupon", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = coupon_service::delete_coupon(&state, &admin, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Get all orders", body = ApiResponse<OrderList>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AuthAdmin,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its frozen items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_order(
    State(state): State<AppState>,
    _admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/announcements",
    responses(
        (status = 200, description = "All announcements", body = ApiResponse<AnnouncementList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_announcements(
    State(state): State<AppState>,
    _admin: AuthAdmin,
) -> AppResult<Json<ApiResponse<AnnouncementList>>> {
    let resp = announcement_service::list_all(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/announcements",
    request_body = CreateAnnouncementRequest,
    responses(
        (status = 200, description = "Create announcement", body = ApiResponse<Announcement>),
        (status = 400, description = "Empty content"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_announcement(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> AppResult<Json<ApiResponse<Announcement>>> {
    let resp = announcement_service::create_announcement(&state, &admin, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/announcements/{id}",
    params(("id" = i64, Path, description = "Announcement ID")),
    request_body = UpdateAnnouncementRequest,
    responses(
        (status = 200, description = "Updated announcement", body = ApiResponse<Announcement>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_announcement(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAnnouncementRequest>,
) -> AppResult<Json<ApiResponse<Announcement>>> {
    let resp = announcement_service::update_announcement(&state, &admin, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/announcements/{id}",
    params(("id" = i64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Deleted announcement", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_announcement(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = announcement_service::delete_announcement(&state, &admin, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses(
        (status = 200, description = "All system settings", body = ApiResponse<SettingList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_settings(
    State(state): State<AppState>,
    _admin: AuthAdmin,
) -> AppResult<Json<ApiResponse<SettingList>>> {
    let resp = setting_service::list_settings(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/admin/settings/{key}",
    params(("key" = String, Path, description = "Setting key, e.g. telegram_bot_token")),
    request_body = UpdateSettingRequest,
    responses(
        (status = 200, description = "Insert or replace a setting", body = ApiResponse<SystemSetting>),
        (status = 400, description = "Invalid key"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn upsert_setting(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(key): Path<String>,
    Json(payload): Json<UpdateSettingRequest>,
) -> AppResult<Json<ApiResponse<SystemSetting>>> {
    let resp = setting_service::upsert_setting(&state, &admin, &key, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/admins",
    responses(
        (status = 200, description = "Admin accounts (superadmin only)", body = ApiResponse<AdminList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_admins(
    State(state): State<AppState>,
    admin: AuthAdmin,
) -> AppResult<Json<ApiResponse<AdminList>>> {
    let resp = admin_service::list_admins(&state, &admin).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 200, description = "Create admin account (superadmin only)", body = ApiResponse<Admin>),
        (status = 400, description = "Invalid input or duplicate username"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_admin(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Json(payload): Json<CreateAdminRequest>,
) -> AppResult<Json<ApiResponse<Admin>>> {
    let resp = admin_service::create_admin(&state, &admin, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/admin/admins/{id}",
    params(("id" = i64, Path, description = "Admin ID")),
    responses(
        (status = 200, description = "Deleted admin (superadmin only)", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Cannot delete own account"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_admin(
    State(state): State<AppState>,
    admin: AuthAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = admin_service::delete_admin(&state, &admin, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs",
    params(Pagination),
    responses(
        (status = 200, description = "Recent admin actions, newest first", body = ApiResponse<AuditLogList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    _admin: AuthAdmin,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<AuditLogList>>> {
    let resp = audit::list_audit_logs(&state, pagination).await?;
    Ok(Json(resp))
}
