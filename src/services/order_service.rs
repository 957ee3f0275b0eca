use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderData, OrderList, OrderWithItems, SubmitOrderRequest, SubmitOrderResponse},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::{Order, OrderItem},
    notifier::TelegramCredentials,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{cart_service, setting_service},
    state::AppState,
};

pub const DEFAULT_SHIPPING_METHOD: &str = "7-11";
pub const STATUS_PENDING: &str = "pending";

const TAIPEI_OFFSET_SECS: i32 = 8 * 3600;
/// Upper bound for any NT$ amount accepted from the client.
pub const MAX_AMOUNT: i64 = 100_000_000;
pub const MAX_LINE_QUANTITY: i32 = 10_000;

pub async fn submit_order(
    state: &AppState,
    payload: SubmitOrderRequest,
) -> AppResult<ApiResponse<SubmitOrderResponse>> {
    let data = payload
        .order_data
        .ok_or_else(|| AppError::bad_request("訂單資料不能為空"))?;
    validate_order_data(&data)?;

    let expected_total = data
        .subtotal
        .checked_sub(data.discount)
        .and_then(|v| v.checked_add(data.shipping_fee))
        .ok_or_else(|| AppError::bad_request("訂單金額無效"))?;
    if expected_total != data.total {
        tracing::warn!(
            subtotal = data.subtotal,
            discount = data.discount,
            shipping_fee = data.shipping_fee,
            total = data.total,
            "client-supplied order total does not add up"
        );
    }

    let (order, items) = persist_order(state, &data).await?;

    if let Some(session_id) = order.session_id.as_deref() {
        match cart_service::clear_session(&state.pool, session_id).await {
            Ok(removed) => tracing::debug!(session_id, removed, "cart cleared after order"),
            Err(err) => tracing::warn!(error = %err, session_id, "failed to clear cart after order"),
        }
    }

    let telegram_sent = notify_new_order(state, &order, &items).await;
    if telegram_sent {
        if let Err(err) = Orders::update_many()
            .col_expr(OrderCol::NotificationSent, sea_orm::sea_query::Expr::value(true))
            .filter(OrderCol::Id.eq(order.id))
            .exec(&state.orm)
            .await
        {
            tracing::warn!(error = %err, order_id = order.id, "failed to flag order as notified");
        }
    }

    tracing::info!(
        order_number = %order.order_number,
        total = order.total,
        items = items.len(),
        telegram_sent,
        "order submitted"
    );

    Ok(ApiResponse::success(
        "訂單已送出",
        SubmitOrderResponse {
            success: true,
            telegram_sent,
            order_id: order.order_number,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::Id),
        SortOrder::Desc => finder.order_by_desc(OrderCol::Id),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items: orders }, Some(meta)))
}

pub async fn get_order(state: &AppState, id: i64) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("找不到訂單"))?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

fn validate_order_data(data: &OrderData) -> AppResult<()> {
    if data.customer_info.name.trim().is_empty() {
        return Err(AppError::bad_request("請填寫收件人姓名"));
    }
    if data.customer_info.phone.trim().is_empty() {
        return Err(AppError::bad_request("請填寫聯絡電話"));
    }
    if data.items.is_empty() {
        return Err(AppError::bad_request("訂單沒有商品"));
    }
    for item in &data.items {
        if item.name.trim().is_empty() {
            return Err(AppError::bad_request("商品名稱不能為空"));
        }
        if item.quantity < 1 {
            return Err(AppError::bad_request("商品數量必須大於 0"));
        }
        if item.quantity > MAX_LINE_QUANTITY {
            return Err(AppError::bad_request("商品數量過大"));
        }
        if !(0..=MAX_AMOUNT).contains(&item.price) {
            return Err(AppError::bad_request("商品價格無效"));
        }
    }
    let amounts = [data.subtotal, data.shipping_fee, data.discount, data.total];
    if amounts.iter().any(|amount| !(0..=MAX_AMOUNT).contains(amount)) {
        return Err(AppError::bad_request("訂單金額無效"));
    }
    Ok(())
}

/// Write the order and its frozen items in one transaction.
async fn persist_order(state: &AppState, data: &OrderData) -> AppResult<(Order, Vec<OrderItem>)> {
    let txn = state.orm.begin().await?;

    let known_products = existing_ids(
        &txn,
        data.items.iter().filter_map(|i| i.product_id).collect(),
        IdTable::Products,
    )
    .await?;
    let known_variants = existing_ids(
        &txn,
        data.items.iter().filter_map(|i| i.variant_id).collect(),
        IdTable::Variants,
    )
    .await?;

    let order_number = data
        .order_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| build_order_number(Uuid::new_v4(), Utc::now()));
    let store = data.store_info.clone().unwrap_or_default();

    let order = OrderActive {
        id: NotSet,
        order_number: Set(order_number),
        session_id: Set(non_blank(data.session_id.clone())),
        customer_name: Set(data.customer_info.name.trim().to_string()),
        customer_phone: Set(data.customer_info.phone.trim().to_string()),
        customer_line_id: Set(non_blank(data.customer_info.line_id.clone())),
        shipping_method: Set(non_blank(data.shipping_method.clone())
            .unwrap_or_else(|| DEFAULT_SHIPPING_METHOD.to_string())),
        store_name: Set(non_blank(store.name)),
        store_number: Set(non_blank(store.number)),
        store_address: Set(non_blank(store.address)),
        subtotal: Set(data.subtotal),
        shipping_fee: Set(data.shipping_fee),
        discount: Set(data.discount),
        total: Set(data.total),
        status: Set(STATUS_PENDING.to_string()),
        coupon_code: Set(non_blank(data.coupon_code.clone())),
        notification_sent: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(&txn)
    .await
    .map_err(|e| AppError::from_orm_with_conflict(e, "訂單編號重複"))?;

    let mut items = Vec::with_capacity(data.items.len());
    for line in &data.items {
        let item = OrderItemActive {
            id: NotSet,
            order_id: Set(order.id),
            product_id: Set(line.product_id.filter(|id| known_products.contains(id))),
            variant_id: Set(line.variant_id.filter(|id| known_variants.contains(id))),
            product_name: Set(line.name.trim().to_string()),
            variant_value: Set(non_blank(line.variant_value.clone())),
            price: Set(line.price),
            quantity: Set(line.quantity),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    Ok((order_from_entity(order), items))
}

enum IdTable {
    Products,
    Variants,
}

/// Which of `ids` still exist; vanished catalog rows are stored as NULL references.
async fn existing_ids<C: ConnectionTrait>(
    conn: &C,
    ids: Vec<i64>,
    table: IdTable,
) -> AppResult<HashSet<i64>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let found = match table {
        IdTable::Products => {
            Products::find()
                .select_only()
                .column(ProdCol::Id)
                .filter(ProdCol::Id.is_in(ids))
                .into_tuple::<i64>()
                .all(conn)
                .await?
        }
        IdTable::Variants => {
            ProductVariants::find()
                .select_only()
                .column(VariantCol::Id)
                .filter(VariantCol::Id.is_in(ids))
                .into_tuple::<i64>()
                .all(conn)
                .await?
        }
    };
    Ok(found.into_iter().collect())
}

/// Send the order summary; returns whether the message was delivered.
async fn notify_new_order(state: &AppState, order: &Order, items: &[OrderItem]) -> bool {
    let credentials = match load_credentials(state).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            tracing::info!(order_number = %order.order_number, "telegram not configured, skipping notification");
            return false;
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to read telegram settings");
            return false;
        }
    };

    let text = format_order_message(order, items);
    match state.notifier.send_message(&credentials, &text).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                error = %err,
                order_number = %order.order_number,
                "telegram notification failed"
            );
            false
        }
    }
}

async fn load_credentials(state: &AppState) -> AppResult<Option<TelegramCredentials>> {
    let bot_token = setting_service::get_value(state, setting_service::TELEGRAM_BOT_TOKEN).await?;
    let chat_id = setting_service::get_value(state, setting_service::TELEGRAM_CHAT_ID).await?;
    Ok(TelegramCredentials::from_parts(bot_token, chat_id))
}

fn taipei() -> FixedOffset {
    FixedOffset::east_opt(TAIPEI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Staff-facing plain-text summary of a new order.
pub fn format_order_message(order: &Order, items: &[OrderItem]) -> String {
    let mut text = String::new();
    let placed_at = order.created_at.with_timezone(&taipei());

    let _ = writeln!(text, "🛒 新訂單通知");
    let _ = writeln!(text);
    let _ = writeln!(text, "訂單編號：{}", order.order_number);
    let _ = writeln!(text, "下單時間：{}", placed_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(text);
    let _ = writeln!(text, "👤 顧客資訊");
    let _ = writeln!(text, "姓名：{}", order.customer_name);
    let _ = writeln!(text, "電話：{}", order.customer_phone);
    if let Some(line_id) = &order.customer_line_id {
        let _ = writeln!(text, "LINE ID：{line_id}");
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "🏪 取貨門市（{}）", order.shipping_method);
    let _ = writeln!(
        text,
        "門市名稱：{}",
        order.store_name.as_deref().unwrap_or("未提供")
    );
    let _ = writeln!(
        text,
        "門市店號：{}",
        order.store_number.as_deref().unwrap_or("未提供")
    );
    if let Some(address) = &order.store_address {
        let _ = writeln!(text, "門市地址：{address}");
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "📦 訂購商品");
    for item in items {
        let line_total = item.price.saturating_mul(i64::from(item.quantity));
        let _ = writeln!(
            text,
            "• {} x {} = NT${}",
            item.product_name, item.quantity, line_total
        );
        if let Some(variant) = &item.variant_value {
            let _ = writeln!(text, "  規格：{variant}");
        }
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "💰 金額明細");
    let _ = writeln!(text, "商品小計：NT${}", order.subtotal);
    let _ = writeln!(text, "運費：NT${}", order.shipping_fee);
    if order.discount > 0 {
        match &order.coupon_code {
            Some(code) => {
                let _ = writeln!(text, "優惠券（{code}）：-NT${}", order.discount);
            }
            None => {
                let _ = writeln!(text, "折扣：-NT${}", order.discount);
            }
        }
    }
    let _ = write!(text, "訂單總額：NT${}", order.total);

    text
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_order_number(id: Uuid, now: DateTime<Utc>) -> String {
    let date = now.with_timezone(&taipei()).format("%Y%m%d");
    let suffix = id.simple().to_string();
    let short = suffix.get(..8).unwrap_or(&suffix).to_uppercase();
    format!("ORD-{date}-{short}")
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        order_number: model.order_number,
        session_id: model.session_id,
        customer_name: model.customer_name,
        customer_phone: model.customer_phone,
        customer_line_id: model.customer_line_id,
        shipping_method: model.shipping_method,
        store_name: model.store_name,
        store_number: model.store_number,
        store_address: model.store_address,
        subtotal: model.subtotal,
        shipping_fee: model.shipping_fee,
        discount: model.discount,
        total: model.total,
        status: model.status,
        coupon_code: model.coupon_code,
        notification_sent: model.notification_sent,
        created_at: model.created_at,
    }
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        variant_id: model.variant_id,
        product_name: model.product_name,
        variant_value: model.variant_value,
        price: model.price,
        quantity: model.quantity,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::dto::orders::{CustomerInfo, OrderLineInput};

    fn sample_order(discount: i64, coupon_code: Option<&str>) -> Order {
        Order {
            id: 1,
            order_number: "ORD-20261019-ABCDEF12".into(),
            session_id: Some("abc".into()),
            customer_name: "王小明".into(),
            customer_phone: "0912345678".into(),
            customer_line_id: Some("ming".into()),
            shipping_method: "7-11".into(),
            store_name: Some("信義門市".into()),
            store_number: Some("123456".into()),
            store_address: None,
            subtotal: 600,
            shipping_fee: 60,
            discount,
            total: 600 - discount + 60,
            status: STATUS_PENDING.into(),
            coupon_code: coupon_code.map(str::to_string),
            notification_sent: false,
            created_at: Utc.with_ymd_and_hms(2026, 10, 19, 4, 30, 0).unwrap(),
        }
    }

    fn sample_items() -> Vec<OrderItem> {
        vec![OrderItem {
            id: 1,
            order_id: 1,
            product_id: Some(7),
            variant_id: Some(12),
            product_name: "Relx 煙彈".into(),
            variant_value: Some("mint".into()),
            price: 300,
            quantity: 2,
        }]
    }

    #[test]
    fn message_contains_customer_store_items_and_totals() {
        let text = format_order_message(&sample_order(50, Some("SAVE50")), &sample_items());
        assert!(text.contains("訂單編號：ORD-20261019-ABCDEF12"));
        assert!(text.contains("下單時間：2026-10-19 12:30:00"));
        assert!(text.contains("姓名：王小明"));
        assert!(text.contains("LINE ID：ming"));
        assert!(text.contains("門市名稱：信義門市"));
        assert!(text.contains("門市店號：123456"));
        assert!(text.contains("• Relx 煙彈 x 2 = NT$600"));
        assert!(text.contains("規格：mint"));
        assert!(text.contains("優惠券（SAVE50）：-NT$50"));
        assert!(text.ends_with("訂單總額：NT$610"));
    }

    #[test]
    fn message_omits_coupon_line_without_discount() {
        let mut order = sample_order(0, None);
        order.customer_line_id = None;
        let text = format_order_message(&order, &sample_items());
        assert!(!text.contains("優惠券"));
        assert!(!text.contains("LINE ID"));
    }

    #[test]
    fn order_number_uses_taipei_date_and_uuid_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
        assert_eq!(build_order_number(id, now), "ORD-20261020-A1B2C3D4");
    }

    #[test]
    fn order_data_requires_customer_and_items() {
        let mut data = OrderData {
            customer_info: CustomerInfo {
                name: "王小明".into(),
                phone: "0912345678".into(),
                line_id: None,
            },
            items: vec![OrderLineInput {
                name: "Relx 煙彈".into(),
                price: 300,
                quantity: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(validate_order_data(&data).is_ok());

        data.items[0].quantity = 0;
        assert!(validate_order_data(&data).is_err());

        data.items.clear();
        assert!(validate_order_data(&data).is_err());

        data.customer_info.phone = " ".into();
        assert!(validate_order_data(&data).is_err());
    }

    #[test]
    fn order_data_rejects_out_of_range_amounts() {
        let valid = OrderData {
            customer_info: CustomerInfo {
                name: "王小明".into(),
                phone: "0912345678".into(),
                line_id: None,
            },
            items: vec![OrderLineInput {
                name: "Relx 煙彈".into(),
                price: 300,
                quantity: 2,
                ..Default::default()
            }],
            subtotal: 600,
            shipping_fee: 60,
            total: 660,
            ..Default::default()
        };
        assert!(validate_order_data(&valid).is_ok());

        let mut data = valid.clone();
        data.items[0].price = i64::MAX / 2;
        assert!(validate_order_data(&data).is_err());

        let mut data = valid.clone();
        data.items[0].quantity = MAX_LINE_QUANTITY + 1;
        assert!(validate_order_data(&data).is_err());

        let mut data = valid.clone();
        data.subtotal = i64::MAX;
        data.shipping_fee = 1;
        assert!(validate_order_data(&data).is_err());

        let mut data = valid;
        data.discount = -1;
        assert!(validate_order_data(&data).is_err());
    }

    #[test]
    fn message_line_total_saturates() {
        let mut items = sample_items();
        items[0].price = i64::MAX / 2;
        items[0].quantity = 3;
        let text = format_order_message(&sample_order(0, None), &items);
        assert!(text.contains(&format!("x 3 = NT${}", i64::MAX)));
    }
}
