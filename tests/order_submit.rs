mod common;

use storefront_api::{
    dto::{
        cart::AddToCartRequest,
        coupons::{CreateCouponRequest, ValidateCouponRequest},
        orders::{CustomerInfo, OrderData, OrderLineInput, StoreInfo, SubmitOrderRequest},
    },
    error::AppError,
    models::{AdminRole, DiscountType},
    routes::params::OrderListQuery,
    services::{cart_service, coupon_service, order_service, setting_service},
    state::AppState,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT_TOKEN: &str = "123:ABC";
const CHAT_ID: &str = "-1001";

fn order_data(session_id: &str, items: Vec<OrderLineInput>) -> OrderData {
    let subtotal: i64 = items.iter().map(|i| i.price * i64::from(i.quantity)).sum();
    OrderData {
        order_id: None,
        session_id: Some(session_id.into()),
        customer_info: CustomerInfo {
            name: "王小明".into(),
            phone: "0912345678".into(),
            line_id: Some("ming".into()),
        },
        shipping_method: Some("7-11".into()),
        store_info: Some(StoreInfo {
            name: Some("信義門市".into()),
            number: Some("123456".into()),
            address: Some("台北市信義區".into()),
        }),
        items,
        subtotal,
        shipping_fee: 60,
        discount: 0,
        total: subtotal + 60,
        coupon_code: None,
    }
}

fn line(product_id: Option<i64>, variant_id: Option<i64>, price: i64, quantity: i32) -> OrderLineInput {
    OrderLineInput {
        product_id,
        variant_id,
        name: "RELX 煙彈".into(),
        variant_value: variant_id.map(|_| "mint".to_string()),
        price,
        quantity,
    }
}

async fn configure_telegram(state: &AppState) -> anyhow::Result<()> {
    common::set_setting(state, setting_service::TELEGRAM_BOT_TOKEN, BOT_TOKEN).await?;
    common::set_setting(state, setting_service::TELEGRAM_CHAT_ID, CHAT_ID).await
}

async fn seed_mint_cartridge(state: &AppState) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO products (id, name, category, brand, price, stock) \
         VALUES (7, 'RELX 煙彈', 'cartridge', 'RELX', 300, 0)",
    )
    .execute(&state.pool)
    .await?;
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, variant_type, variant_value, stock, price_delta) \
         VALUES (12, 7, 'flavor', 'mint', 5, 0)",
    )
    .execute(&state.pool)
    .await?;
    Ok(())
}

#[tokio::test]
async fn missing_order_data_is_rejected() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let result = order_service::submit_order(&state, SubmitOrderRequest { order_data: None }).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn order_without_telegram_credentials_still_succeeds() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let data = order_data("abc", vec![line(None, None, 300, 1)]);

    let resp = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) })
        .await?
        .data
        .expect("response");
    assert!(resp.success);
    assert!(!resp.telegram_sent);
    assert!(resp.order_id.starts_with("ORD-"));

    let orders = order_service::list_orders(&state, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(orders.items.len(), 1);
    assert!(!orders.items[0].notification_sent);
    Ok(())
}

#[tokio::test]
async fn telegram_failure_is_soft() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let state = common::setup_state_with_telegram(&server.uri()).await?;
    configure_telegram(&state).await?;

    let data = order_data("abc", vec![line(None, None, 300, 1)]);
    let resp = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) })
        .await?
        .data
        .expect("response");
    assert!(resp.success);
    assert!(!resp.telegram_sent);

    let orders = order_service::list_orders(&state, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(orders.items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_catalog_references_are_stored_as_null() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let data = order_data("abc", vec![line(Some(404), Some(405), 300, 1)]);

    order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) }).await?;

    let orders = order_service::list_orders(&state, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    let detail = order_service::get_order(&state, orders.items[0].id)
        .await?
        .data
        .expect("order");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_id, None);
    assert_eq!(detail.items[0].variant_id, None);
    assert_eq!(detail.items[0].product_name, "RELX 煙彈");
    Ok(())
}

#[tokio::test]
async fn duplicate_client_order_number_is_rejected() -> anyhow::Result<()> {
    let state = common::setup_state().await?;
    let mut data = order_data("abc", vec![line(None, None, 300, 1)]);
    data.order_id = Some("ORD-FIXED".into());

    order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data.clone()) }).await?;
    let again = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) }).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn oversized_amounts_are_rejected_before_anything_is_stored() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let state = common::setup_state_with_telegram(&server.uri()).await?;
    configure_telegram(&state).await?;

    let mut data = order_data("abc", vec![line(None, None, 300, 3)]);
    data.items[0].price = i64::MAX / 2;
    let result = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) }).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let mut data = order_data("abc", vec![line(None, None, 300, 1)]);
    data.subtotal = i64::MAX;
    data.shipping_fee = 1;
    let result = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) }).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let orders = order_service::list_orders(&state, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert!(orders.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn cart_to_notified_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .and(body_partial_json(serde_json::json!({ "chat_id": CHAT_ID })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let state = common::setup_state_with_telegram(&server.uri()).await?;
    configure_telegram(&state).await?;
    seed_mint_cartridge(&state).await?;
    let admin = common::insert_admin(&state, "owner", "password1", AdminRole::Superadmin).await?;
    coupon_service::create_coupon(
        &state,
        &admin,
        CreateCouponRequest {
            code: "SAVE50".into(),
            discount_type: DiscountType::Fixed,
            discount_value: 50,
            min_amount: 500,
            expires_at: None,
            is_active: true,
        },
    )
    .await?;

    cart_service::add_item(
        &state,
        "abc",
        AddToCartRequest {
            product_id: 7,
            variant_id: Some(12),
            quantity: 2,
        },
    )
    .await?;
    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert_eq!(cart.subtotal, 600);

    let quote = coupon_service::validate_coupon(
        &state,
        ValidateCouponRequest {
            code: "SAVE50".into(),
            amount: cart.eligible_subtotal,
        },
    )
    .await?
    .data
    .expect("quote");
    assert_eq!(quote.discount_amount, 50);

    let mut data = order_data("abc", vec![line(Some(7), Some(12), 300, 2)]);
    data.discount = quote.discount_amount;
    data.coupon_code = Some("SAVE50".into());
    data.total = cart.subtotal - quote.discount_amount + data.shipping_fee;
    assert_eq!(data.total, 610);

    let resp = order_service::submit_order(&state, SubmitOrderRequest { order_data: Some(data) })
        .await?
        .data
        .expect("response");
    assert!(resp.success);
    assert!(resp.telegram_sent);

    let cart = cart_service::get_cart(&state, "abc").await?.data.expect("cart");
    assert!(cart.items.is_empty());

    // Later catalog edits do not touch the stored snapshot.
    sqlx::query("UPDATE products SET price = 999 WHERE id = 7")
        .execute(&state.pool)
        .await?;

    let orders = order_service::list_orders(&state, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    let order = &orders.items[0];
    assert_eq!(order.order_number, resp.order_id);
    assert_eq!(order.total, 610);
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE50"));
    assert!(order.notification_sent);

    let detail = order_service::get_order(&state, order.id).await?.data.expect("order");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product_id, Some(7));
    assert_eq!(detail.items[0].variant_id, Some(12));
    assert_eq!(detail.items[0].variant_value.as_deref(), Some("mint"));
    assert_eq!(detail.items[0].price, 300);
    assert_eq!(detail.items[0].quantity, 2);

    let requests = server.received_requests().await.expect("recorded requests");
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    let text = sent["text"].as_str().unwrap_or_default();
    assert!(text.contains("RELX 煙彈 x 2 = NT$600"));
    assert!(text.contains("優惠券（SAVE50）：-NT$50"));
    assert!(text.contains("訂單總額：NT$610"));
    Ok(())
}
