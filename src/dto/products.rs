use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, ProductCategory, ProductWithVariants};

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewVariantRequest {
    pub variant_type: String,
    pub variant_value: String,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub price_delta: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: ProductCategory,
    #[serde(default)]
    pub brand: String,
    pub price: i64,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub is_discontinued: bool,
    #[serde(default)]
    pub coupon_excluded: bool,
    #[serde(default)]
    pub variants: Vec<NewVariantRequest>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<ProductCategory>,
    pub brand: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub stock: Option<i32>,
    pub is_discontinued: Option<bool>,
    pub coupon_excluded: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateVariantRequest {
    pub variant_type: Option<String>,
    pub variant_value: Option<String>,
    pub stock: Option<i32>,
    pub price_delta: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StockAdjustRequest {
    pub delta: i32,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<ProductWithVariants>,
}

#[derive(Serialize, ToSchema)]
pub struct LowStockList {
    pub items: Vec<Product>,
}

#[derive(Serialize, ToSchema)]
pub struct BrandList {
    pub items: Vec<String>,
}
