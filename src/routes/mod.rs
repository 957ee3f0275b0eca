use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod announcements;
pub mod auth;
pub mod cart;
pub mod coupons;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .nest("/coupons", coupons::router())
        .nest("/orders", orders::router())
        .nest("/announcements", announcements::router())
        .nest("/admin", auth::router().merge(admin::router()))
}
