use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Order, OrderItem};

/// Body of `POST /api/orders/submit`. `orderData` may be absent or null;
/// the service rejects that with a bad request.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrderRequest {
    #[serde(default)]
    pub order_data: Option<OrderData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderData {
    /// Client-generated order number; one is generated when absent.
    pub order_id: Option<String>,
    pub session_id: Option<String>,
    pub customer_info: CustomerInfo,
    pub shipping_method: Option<String>,
    pub store_info: Option<StoreInfo>,
    pub items: Vec<OrderLineInput>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    pub line_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreInfo {
    pub name: Option<String>,
    pub number: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderLineInput {
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub name: String,
    pub variant_value: Option<String>,
    pub price: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrderResponse {
    pub success: bool,
    pub telegram_sent: bool,
    pub order_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
