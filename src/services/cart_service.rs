use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use sqlx::FromRow;

use crate::{
    db::DbPool,
    dto::cart::{AddToCartRequest, CartLine, CartSummary, ClearCartResult, UpdateCartItemRequest},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        product_variants::Entity as ProductVariants,
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    models::CartItem,
    response::{ApiResponse, Meta},
    state::AppState,
};

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(FromRow)]
struct CartItemRow {
    id: i64,
    session_id: String,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        CartItem {
            id: row.id,
            session_id: row.session_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
        }
    }
}

#[derive(FromRow)]
struct CartLineRow {
    id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
    name: String,
    brand: String,
    image_url: Option<String>,
    price: i64,
    product_stock: i32,
    coupon_excluded: bool,
    variant_type: Option<String>,
    variant_value: Option<String>,
    price_delta: Option<i64>,
    variant_stock: Option<i32>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        let price_delta = row.price_delta.unwrap_or(0);
        let unit_price = row.price + price_delta;
        CartLine {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            name: row.name,
            brand: row.brand,
            image_url: row.image_url,
            price: row.price,
            price_delta,
            variant_type: row.variant_type,
            variant_value: row.variant_value,
            coupon_excluded: row.coupon_excluded,
            available_stock: row.variant_stock.unwrap_or(row.product_stock),
            unit_price,
            line_total: unit_price * i64::from(row.quantity),
        }
    }
}

pub fn validate_session_id(session_id: &str) -> AppResult<&str> {
    let session_id = session_id.trim();
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::bad_request("購物車識別碼無效"));
    }
    Ok(session_id)
}

/// Totals over the given lines; the eligible subtotal skips coupon-excluded products.
pub fn summarize(session_id: &str, items: Vec<CartLine>) -> CartSummary {
    let subtotal = items.iter().map(|line| line.line_total).sum();
    let eligible_subtotal = items
        .iter()
        .filter(|line| !line.coupon_excluded)
        .map(|line| line.line_total)
        .sum();
    let item_count = items.iter().map(|line| i64::from(line.quantity)).sum();

    CartSummary {
        session_id: session_id.to_string(),
        items,
        subtotal,
        eligible_subtotal,
        item_count,
    }
}

pub async fn get_cart(state: &AppState, session_id: &str) -> AppResult<ApiResponse<CartSummary>> {
    let session_id = validate_session_id(session_id)?;
    let items = load_lines(&state.pool, session_id).await?;
    Ok(ApiResponse::success(
        "OK",
        summarize(session_id, items),
        Some(Meta::empty()),
    ))
}

pub async fn add_item(
    state: &AppState,
    session_id: &str,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let session_id = validate_session_id(session_id)?;
    if payload.quantity < 1 {
        return Err(AppError::bad_request("數量必須大於 0"));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("找不到商品"))?;
    if product.is_discontinued {
        return Err(AppError::bad_request("商品已停售"));
    }

    let available = match payload.variant_id {
        Some(variant_id) => {
            let variant = ProductVariants::find_by_id(variant_id)
                .one(&state.orm)
                .await?
                .filter(|v| v.product_id == product.id)
                .ok_or_else(|| AppError::not_found("找不到商品規格"))?;
            variant.stock
        }
        None => product.stock,
    };

    if payload.quantity > available {
        return Err(AppError::bad_request("庫存不足"));
    }

    // Insert-or-increment in one statement. The WHERE guard refuses a merge
    // that would exceed stock; no row comes back in that case.
    let row = sqlx::query_as::<_, CartItemRow>(
        r#"
        INSERT INTO cart_items (session_id, product_id, variant_id, quantity)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (session_id, product_id, variant_key) DO UPDATE
            SET quantity = cart_items.quantity + excluded.quantity,
                updated_at = CURRENT_TIMESTAMP
            WHERE cart_items.quantity + excluded.quantity <= ?5
        RETURNING id, session_id, product_id, variant_id, quantity
        "#,
    )
    .bind(session_id)
    .bind(product.id)
    .bind(payload.variant_id)
    .bind(payload.quantity)
    .bind(available)
    .fetch_optional(&state.pool)
    .await?;

    let item = row.ok_or_else(|| AppError::bad_request("庫存不足"))?;

    tracing::debug!(
        session_id,
        product_id = item.product_id,
        variant_id = ?item.variant_id,
        quantity = item.quantity,
        "cart line upserted"
    );

    Ok(ApiResponse::success("Added to cart", item.into(), None))
}

pub async fn update_item(
    state: &AppState,
    item_id: i64,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity < 1 {
        return Err(AppError::bad_request("數量必須大於 0"));
    }

    let item = CartItems::find_by_id(item_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("找不到購物車項目"))?;

    let available = match item.variant_id {
        Some(variant_id) => ProductVariants::find_by_id(variant_id)
            .one(&state.orm)
            .await?
            .map(|v| v.stock),
        None => Products::find_by_id(item.product_id)
            .one(&state.orm)
            .await?
            .map(|p| p.stock),
    }
    .ok_or_else(|| AppError::not_found("找不到商品"))?;

    if payload.quantity > available {
        return Err(AppError::bad_request("庫存不足"));
    }

    let result = CartItems::update_many()
        .col_expr(CartCol::Quantity, Expr::value(payload.quantity))
        .col_expr(CartCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(CartCol::Id.eq(item_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到購物車項目"));
    }

    let updated = CartItem {
        id: item.id,
        session_id: item.session_id,
        product_id: item.product_id,
        variant_id: item.variant_id,
        quantity: payload.quantity,
    };
    Ok(ApiResponse::success("Updated", updated, None))
}

pub async fn remove_item(
    state: &AppState,
    item_id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_by_id(item_id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到購物車項目"));
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    session_id: &str,
) -> AppResult<ApiResponse<ClearCartResult>> {
    let session_id = validate_session_id(session_id)?;
    let removed = clear_session(&state.pool, session_id).await?;
    Ok(ApiResponse::success(
        "Cart cleared",
        ClearCartResult { removed },
        Some(Meta::empty()),
    ))
}

pub(crate) async fn clear_session(pool: &DbPool, session_id: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = ?1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

async fn load_lines(pool: &DbPool, session_id: &str) -> AppResult<Vec<CartLine>> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.id, ci.product_id, ci.variant_id, ci.quantity,
               p.name, p.brand, p.image_url, p.price,
               p.stock AS product_stock, p.coupon_excluded,
               v.variant_type, v.variant_value, v.price_delta,
               v.stock AS variant_stock
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        LEFT JOIN product_variants v ON v.id = ci.variant_id
        WHERE ci.session_id = ?1
        ORDER BY ci.id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CartLine::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, price: i64, delta: i64, quantity: i32, excluded: bool) -> CartLine {
        CartLine {
            id,
            product_id: id,
            variant_id: None,
            quantity,
            name: format!("item-{id}"),
            brand: "brand".into(),
            image_url: None,
            price,
            price_delta: delta,
            variant_type: None,
            variant_value: None,
            coupon_excluded: excluded,
            available_stock: 10,
            unit_price: price + delta,
            line_total: (price + delta) * i64::from(quantity),
        }
    }

    #[test]
    fn summarize_sums_lines_and_counts_units() {
        let summary = summarize("abc", vec![line(1, 300, 0, 2, false), line(2, 450, 50, 1, false)]);
        assert_eq!(summary.subtotal, 1100);
        assert_eq!(summary.eligible_subtotal, 1100);
        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.session_id, "abc");
    }

    #[test]
    fn summarize_excludes_coupon_excluded_lines_from_eligible_subtotal() {
        let summary = summarize("abc", vec![line(1, 300, 0, 2, false), line(2, 1000, 0, 1, true)]);
        assert_eq!(summary.subtotal, 1600);
        assert_eq!(summary.eligible_subtotal, 600);
    }

    #[test]
    fn empty_cart_summarizes_to_zero() {
        let summary = summarize("abc", Vec::new());
        assert_eq!(summary.subtotal, 0);
        assert_eq!(summary.item_count, 0);
        assert!(summary.items.is_empty());
    }

    #[test]
    fn session_id_must_be_present_and_bounded() {
        assert!(validate_session_id("  ").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
        assert_eq!(validate_session_id(" abc ").ok(), Some("abc"));
    }
}
