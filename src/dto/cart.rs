use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

/// A cart line joined with the live catalog rows it points at.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub name: String,
    pub brand: String,
    pub image_url: Option<String>,
    pub price: i64,
    pub price_delta: i64,
    pub variant_type: Option<String>,
    pub variant_value: Option<String>,
    pub coupon_excluded: bool,
    /// Stock of the purchasable unit: the variant when one is chosen.
    pub available_stock: i32,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartSummary {
    pub session_id: String,
    pub items: Vec<CartLine>,
    pub subtotal: i64,
    /// Subtotal of lines whose product accepts coupons.
    pub eligible_subtotal: i64,
    pub item_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCartResult {
    pub removed: u64,
}
