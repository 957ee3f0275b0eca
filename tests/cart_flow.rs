mod common;

use storefront_api::{
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    error::AppError,
    services::cart_service,
};

fn add(product_id: i64, variant_id: Option<i64>, quantity: i32) -> AddToCartRequest {
    AddToCartRequest {
        product_id,
        variant_id,
        quantity,
    }
}

#[tokio::test]
async fn adding_the_same_line_twice_merges_quantities() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 0, false).await?;
    let mint = common::insert_variant(&state, product, "mint", 10, 0).await?;

    let first = cart_service::add_item(&state, "abc", add(product, Some(mint), 2)).await?;
    let second = cart_service::add_item(&state, "abc", add(product, Some(mint), 3)).await?;

    let first = first.data.expect("item");
    let second = second.data.expect("item");
    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 5);

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.subtotal, 1500);
    Ok(())
}

#[tokio::test]
async fn lines_without_variant_merge_and_stay_apart_from_variant_lines() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "Disposable", 450, 10, false).await?;
    let grape = common::insert_variant(&state, product, "grape", 10, 20).await?;

    cart_service::add_item(&state, "abc", add(product, None, 1)).await?;
    cart_service::add_item(&state, "abc", add(product, None, 1)).await?;
    cart_service::add_item(&state, "abc", add(product, Some(grape), 1)).await?;
    // Another session never sees these lines.
    cart_service::add_item(&state, "other", add(product, None, 1)).await?;

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.items[0].variant_id, None);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.items[1].unit_price, 470);
    assert_eq!(cart.subtotal, 450 * 2 + 470);
    assert_eq!(cart.item_count, 3);
    Ok(())
}

#[tokio::test]
async fn merge_beyond_stock_is_rejected_and_leaves_quantity_alone() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 0, false).await?;
    let mint = common::insert_variant(&state, product, "mint", 5, 0).await?;

    cart_service::add_item(&state, "abc", add(product, Some(mint), 4)).await?;
    let err = cart_service::add_item(&state, "abc", add(product, Some(mint), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.items[0].quantity, 4);
    Ok(())
}

#[tokio::test]
async fn invalid_adds_are_rejected() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 3, false).await?;
    let other = common::insert_product(&state, "Other", 100, 3, false).await?;
    let foreign_variant = common::insert_variant(&state, other, "mint", 3, 0).await?;

    let zero = cart_service::add_item(&state, "abc", add(product, None, 0)).await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));

    let missing = cart_service::add_item(&state, "abc", add(9999, None, 1)).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let mismatched = cart_service::add_item(&state, "abc", add(product, Some(foreign_variant), 1)).await;
    assert!(matches!(mismatched, Err(AppError::NotFound(_))));

    let too_many = cart_service::add_item(&state, "abc", add(product, None, 4)).await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    sqlx::query("UPDATE products SET is_discontinued = 1 WHERE id = ?1")
        .bind(product)
        .execute(&state.pool)
        .await?;
    let discontinued = cart_service::add_item(&state, "abc", add(product, None, 1)).await;
    assert!(matches!(discontinued, Err(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn update_replaces_quantity_and_rejects_below_one() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 10, false).await?;
    let item = cart_service::add_item(&state, "abc", add(product, None, 2))
        .await?
        .data
        .expect("item");

    let updated = cart_service::update_item(&state, item.id, UpdateCartItemRequest { quantity: 7 })
        .await?
        .data
        .expect("item");
    assert_eq!(updated.quantity, 7);

    let zero = cart_service::update_item(&state, item.id, UpdateCartItemRequest { quantity: 0 }).await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));

    let over = cart_service::update_item(&state, item.id, UpdateCartItemRequest { quantity: 11 }).await;
    assert!(matches!(over, Err(AppError::BadRequest(_))));

    let missing = cart_service::update_item(&state, 9999, UpdateCartItemRequest { quantity: 1 }).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn removing_twice_reports_not_found_the_second_time() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 10, false).await?;
    let item = cart_service::add_item(&state, "abc", add(product, None, 1))
        .await?
        .data
        .expect("item");

    cart_service::remove_item(&state, item.id).await?;
    let again = cart_service::remove_item(&state, item.id).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert!(cart.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn cart_reflects_live_price_changes() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 10, false).await?;
    cart_service::add_item(&state, "abc", add(product, None, 2)).await?;

    sqlx::query("UPDATE products SET price = 350 WHERE id = ?1")
        .bind(product)
        .execute(&state.pool)
        .await?;

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.items[0].price, 350);
    assert_eq!(cart.subtotal, 700);
    Ok(())
}

#[tokio::test]
async fn coupon_excluded_lines_do_not_count_toward_eligible_subtotal() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let regular = common::insert_product(&state, "RELX 煙彈", 300, 10, false).await?;
    let excluded = common::insert_product(&state, "限定主機", 1000, 10, true).await?;
    cart_service::add_item(&state, "abc", add(regular, None, 2)).await?;
    cart_service::add_item(&state, "abc", add(excluded, None, 1)).await?;

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.subtotal, 1600);
    assert_eq!(cart.eligible_subtotal, 600);
    Ok(())
}

#[tokio::test]
async fn clear_cart_only_touches_one_session() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let product = common::insert_product(&state, "RELX 煙彈", 300, 10, false).await?;
    cart_service::add_item(&state, "abc", add(product, None, 1)).await?;
    cart_service::add_item(&state, "xyz", add(product, None, 1)).await?;

    let cleared = cart_service::clear_cart(&state, "abc").await?.data.expect("result");
    assert_eq!(cleared.removed, 1);

    assert!(cart_service::get_cart(&state, "abc").await?.data.expect("cart").items.is_empty());
    assert_eq!(cart_service::get_cart(&state, "xyz").await?.data.expect("cart").items.len(), 1);
    Ok(())
}
