use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::{
    audit,
    dto::products::{
        BrandList, CreateProductRequest, LowStockList, NewVariantRequest, ProductList,
        StockAdjustRequest, UpdateProductRequest, UpdateVariantRequest,
    },
    entity::{
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
            Model as VariantModel,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthAdmin,
    models::{Product, ProductVariant, ProductWithVariants},
    response::{ApiResponse, Meta},
    routes::params::{BrandQuery, LowStockQuery, ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(category) = query.category {
        condition = condition.add(Column::Category.eq(category.as_str()));
    }

    if let Some(brand) = query.brand.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Brand.eq(brand.as_str()));
    }

    // SQLite LIKE is case-insensitive for ASCII.
    if let Some(search) = query.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(Column::Name.contains(search))
                .add(Column::Brand.contains(search))
                .add(Column::Description.contains(search)),
        );
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col).order_by_asc(Column::Id),
        SortOrder::Desc => finder.order_by_desc(sort_col).order_by_desc(Column::Id),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = attach_variants(&state.orm, products).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn list_brands(state: &AppState, query: BrandQuery) -> AppResult<ApiResponse<BrandList>> {
    let mut finder = Products::find()
        .select_only()
        .column(Column::Brand)
        .distinct()
        .filter(Column::Brand.ne(""));
    if let Some(category) = query.category {
        finder = finder.filter(Column::Category.eq(category.as_str()));
    }

    let items = finder
        .order_by_asc(Column::Brand)
        .into_tuple::<String>()
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success("Brands", BrandList { items }, None))
}

pub async fn get_product(state: &AppState, id: i64) -> AppResult<ApiResponse<ProductWithVariants>> {
    let product = find_product(&state.orm, id).await?;
    let mut items = attach_variants(&state.orm, vec![product]).await?;
    let product = items
        .pop()
        .ok_or_else(|| AppError::not_found("找不到商品"))?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    admin: &AuthAdmin,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<ProductWithVariants>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("商品名稱不能為空"));
    }
    if payload.price < 0 {
        return Err(AppError::bad_request("價格不可為負數"));
    }
    if payload.stock < 0 {
        return Err(AppError::bad_request("庫存不可為負數"));
    }
    for variant in &payload.variants {
        validate_new_variant(variant)?;
    }

    let now = Utc::now();
    let txn = state.orm.begin().await?;

    let product = ActiveModel {
        id: NotSet,
        name: Set(name),
        category: Set(payload.category.as_str().to_string()),
        brand: Set(payload.brand.trim().to_string()),
        price: Set(payload.price),
        description: Set(payload.description),
        image_url: Set(payload.image_url),
        stock: Set(payload.stock),
        is_discontinued: Set(payload.is_discontinued),
        coupon_excluded: Set(payload.coupon_excluded),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    for variant in payload.variants {
        insert_variant(&txn, product.id, variant).await?;
    }

    txn.commit().await?;

    audit::record(
        state,
        admin,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let mut items = attach_variants(&state.orm, vec![product]).await?;
    let product = items
        .pop()
        .ok_or_else(|| AppError::not_found("找不到商品"))?;
    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing = find_product(&state.orm, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::bad_request("商品名稱不能為空"));
        }
        active.name = Set(name);
    }
    if let Some(category) = payload.category {
        active.category = Set(category.as_str().to_string());
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(brand.trim().to_string());
    }
    if let Some(price) = payload.price {
        if price < 0 {
            return Err(AppError::bad_request("價格不可為負數"));
        }
        active.price = Set(price);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::bad_request("庫存不可為負數"));
        }
        active.stock = Set(stock);
    }
    if let Some(is_discontinued) = payload.is_discontinued {
        active.is_discontinued = Set(is_discontinued);
    }
    if let Some(coupon_excluded) = payload.coupon_excluded {
        active.coupon_excluded = Set(coupon_excluded);
    }
    active.updated_at = Set(Utc::now());

    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        admin,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product)?,
        Some(Meta::empty()),
    ))
}

/// Variants and cart lines go with the product; order items keep their snapshot.
pub async fn delete_product(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到商品"));
    }

    audit::record(
        state,
        admin,
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn adjust_stock(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: StockAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    if payload.delta == 0 {
        return Err(AppError::bad_request("調整數量不可為 0"));
    }
    let required = payload
        .delta
        .checked_neg()
        .ok_or_else(|| AppError::bad_request("調整數量無效"))?;

    // One conditional UPDATE; concurrent adjustments cannot take stock below zero.
    let result = Products::update_many()
        .col_expr(Column::Stock, Expr::col(Column::Stock).add(payload.delta))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .filter(Column::Stock.gte(required))
        .exec(&state.orm)
        .await?;

    let product = find_product(&state.orm, id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::bad_request("庫存不可為負數"));
    }

    audit::record(
        state,
        admin,
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        product_from_entity(product)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    query: LowStockQuery,
) -> AppResult<ApiResponse<LowStockList>> {
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(Column::Stock.lte(threshold))
        .filter(Column::IsDiscontinued.eq(false))
        .order_by_asc(Column::Stock)
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", LowStockList { items }, Some(meta)))
}

pub async fn create_variant(
    state: &AppState,
    admin: &AuthAdmin,
    product_id: i64,
    payload: NewVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    validate_new_variant(&payload)?;
    find_product(&state.orm, product_id).await?;

    let variant = insert_variant(&state.orm, product_id, payload).await?;

    audit::record(
        state,
        admin,
        "variant_create",
        "product_variants",
        serde_json::json!({ "product_id": product_id, "variant_id": variant.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Variant created",
        variant_from_entity(variant),
        Some(Meta::empty()),
    ))
}

pub async fn update_variant(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: UpdateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    let existing = find_variant(&state.orm, id).await?;

    let mut active: VariantActive = existing.into();
    if let Some(variant_type) = payload.variant_type {
        let variant_type = variant_type.trim().to_string();
        if variant_type.is_empty() {
            return Err(AppError::bad_request("規格類型不能為空"));
        }
        active.variant_type = Set(variant_type);
    }
    if let Some(variant_value) = payload.variant_value {
        let variant_value = variant_value.trim().to_string();
        if variant_value.is_empty() {
            return Err(AppError::bad_request("規格內容不能為空"));
        }
        active.variant_value = Set(variant_value);
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::bad_request("庫存不可為負數"));
        }
        active.stock = Set(stock);
    }
    if let Some(price_delta) = payload.price_delta {
        active.price_delta = Set(price_delta);
    }

    let variant = active.update(&state.orm).await?;

    audit::record(
        state,
        admin,
        "variant_update",
        "product_variants",
        serde_json::json!({ "variant_id": variant.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Variant updated",
        variant_from_entity(variant),
        Some(Meta::empty()),
    ))
}

pub async fn delete_variant(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = ProductVariants::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到商品規格"));
    }

    audit::record(
        state,
        admin,
        "variant_delete",
        "product_variants",
        serde_json::json!({ "variant_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn adjust_variant_stock(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: StockAdjustRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    if payload.delta == 0 {
        return Err(AppError::bad_request("調整數量不可為 0"));
    }
    let required = payload
        .delta
        .checked_neg()
        .ok_or_else(|| AppError::bad_request("調整數量無效"))?;

    let result = ProductVariants::update_many()
        .col_expr(
            VariantCol::Stock,
            Expr::col(VariantCol::Stock).add(payload.delta),
        )
        .filter(VariantCol::Id.eq(id))
        .filter(VariantCol::Stock.gte(required))
        .exec(&state.orm)
        .await?;

    let variant = find_variant(&state.orm, id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::bad_request("庫存不可為負數"));
    }

    audit::record(
        state,
        admin,
        "variant_inventory_adjust",
        "product_variants",
        serde_json::json!({ "variant_id": id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        variant_from_entity(variant),
        Some(Meta::empty()),
    ))
}

async fn find_product<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("找不到商品"))
}

async fn find_variant<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<VariantModel> {
    ProductVariants::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("找不到商品規格"))
}

fn validate_new_variant(variant: &NewVariantRequest) -> AppResult<()> {
    if variant.variant_type.trim().is_empty() {
        return Err(AppError::bad_request("規格類型不能為空"));
    }
    if variant.variant_value.trim().is_empty() {
        return Err(AppError::bad_request("規格內容不能為空"));
    }
    if variant.stock < 0 {
        return Err(AppError::bad_request("庫存不可為負數"));
    }
    Ok(())
}

async fn insert_variant<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    variant: NewVariantRequest,
) -> AppResult<VariantModel> {
    let model = VariantActive {
        id: NotSet,
        product_id: Set(product_id),
        variant_type: Set(variant.variant_type.trim().to_string()),
        variant_value: Set(variant.variant_value.trim().to_string()),
        stock: Set(variant.stock),
        price_delta: Set(variant.price_delta),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Load the variants of every product in one query and nest them.
async fn attach_variants<C: ConnectionTrait>(
    conn: &C,
    products: Vec<ProductModel>,
) -> AppResult<Vec<ProductWithVariants>> {
    let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
    let variants = if ids.is_empty() {
        Vec::new()
    } else {
        ProductVariants::find()
            .filter(VariantCol::ProductId.is_in(ids))
            .order_by_asc(VariantCol::Id)
            .all(conn)
            .await?
    };

    let mut grouped: HashMap<i64, Vec<ProductVariant>> = HashMap::new();
    for variant in variants {
        grouped
            .entry(variant.product_id)
            .or_default()
            .push(variant_from_entity(variant));
    }

    products
        .into_iter()
        .map(|model| {
            let variants = grouped.remove(&model.id).unwrap_or_default();
            Ok(ProductWithVariants {
                product: product_from_entity(model)?,
                variants,
            })
        })
        .collect()
}

pub(crate) fn product_from_entity(model: ProductModel) -> AppResult<Product> {
    let category = model
        .category
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Product {
        id: model.id,
        name: model.name,
        category,
        brand: model.brand,
        price: model.price,
        description: model.description,
        image_url: model.image_url,
        stock: model.stock,
        is_discontinued: model.is_discontinued,
        coupon_excluded: model.coupon_excluded,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn variant_from_entity(model: VariantModel) -> ProductVariant {
    ProductVariant {
        id: model.id,
        product_id: model.product_id,
        variant_type: model.variant_type,
        variant_value: model.variant_value,
        stock: model.stock,
        price_delta: model.price_delta,
    }
}
