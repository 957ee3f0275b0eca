use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use thiserror::Error;

use crate::{
    audit,
    dto::coupons::{
        CouponList, CouponValidation, CreateCouponRequest, UpdateCouponRequest,
        ValidateCouponRequest,
    },
    entity::coupons::{ActiveModel, Column, Entity as Coupons, Model as CouponModel},
    error::{AppError, AppResult},
    middleware::auth::AuthAdmin,
    models::{Coupon, DiscountType},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Why a coupon cannot be applied to a subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("優惠碼不存在")]
    NotFound,

    #[error("優惠碼已停用")]
    Inactive,

    #[error("優惠碼已過期")]
    Expired,

    #[error("未達優惠碼最低消費金額 NT${minimum}")]
    BelowMinimum { minimum: i64 },
}

impl From<CouponRejection> for AppError {
    fn from(rejection: CouponRejection) -> Self {
        match rejection {
            CouponRejection::NotFound => AppError::NotFound(rejection.to_string()),
            _ => AppError::BadRequest(rejection.to_string()),
        }
    }
}

/// Discount computed for one subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub discount: i64,
    pub final_amount: i64,
}

/// Amount taken off `subtotal`. Percentages round down to whole units and a
/// fixed amount never exceeds the subtotal.
pub fn discount_for(discount_type: DiscountType, value: i64, subtotal: i64) -> i64 {
    let raw = match discount_type {
        DiscountType::Percentage => subtotal.saturating_mul(value) / 100,
        DiscountType::Fixed => value,
    };
    raw.clamp(0, subtotal.max(0))
}

/// Check the coupon's rules in order: active, not expired, minimum met.
pub fn evaluate(coupon: &Coupon, subtotal: i64, now: DateTime<Utc>) -> Result<Quote, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.expires_at.is_some_and(|expires_at| expires_at < now) {
        return Err(CouponRejection::Expired);
    }
    if subtotal < coupon.min_amount {
        return Err(CouponRejection::BelowMinimum {
            minimum: coupon.min_amount,
        });
    }

    let discount = discount_for(coupon.discount_type, coupon.discount_value, subtotal);
    Ok(Quote {
        discount,
        final_amount: subtotal - discount,
    })
}

pub async fn validate_coupon(
    state: &AppState,
    payload: ValidateCouponRequest,
) -> AppResult<ApiResponse<CouponValidation>> {
    if payload.amount < 0 {
        return Err(AppError::bad_request("金額無效"));
    }
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(AppError::bad_request("請輸入優惠碼"));
    }

    // Exact match: codes are case-sensitive as stored.
    let coupon = Coupons::find()
        .filter(Column::Code.eq(code))
        .one(&state.orm)
        .await?
        .ok_or(CouponRejection::NotFound)?;
    let coupon = coupon_from_entity(coupon)?;

    let quote = evaluate(&coupon, payload.amount, Utc::now())?;

    tracing::debug!(
        code = %coupon.code,
        subtotal = payload.amount,
        discount = quote.discount,
        "coupon applied"
    );

    Ok(ApiResponse::success(
        "優惠碼可使用",
        CouponValidation {
            coupon,
            discount_amount: quote.discount,
            final_amount: quote.final_amount,
        },
        None,
    ))
}

pub async fn list_coupons(state: &AppState) -> AppResult<ApiResponse<CouponList>> {
    let items = Coupons::find()
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(coupon_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Coupons",
        CouponList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_coupon(
    state: &AppState,
    admin: &AuthAdmin,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    let code = payload.code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::bad_request("優惠碼不能為空"));
    }
    validate_rules(payload.discount_type, payload.discount_value, payload.min_amount)?;

    let coupon = ActiveModel {
        id: NotSet,
        code: Set(code),
        discount_type: Set(payload.discount_type.as_str().to_string()),
        discount_value: Set(payload.discount_value),
        min_amount: Set(payload.min_amount),
        expires_at: Set(payload.expires_at),
        is_active: Set(payload.is_active),
        created_at: Set(Utc::now()),
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::from_orm_with_conflict(e, "優惠碼已存在"))?;

    audit::record(
        state,
        admin,
        "coupon_create",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon created",
        coupon_from_entity(coupon)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    let existing = Coupons::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("找不到優惠碼"))?;

    let current_type: DiscountType = existing
        .discount_type
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    let discount_type = payload.discount_type.unwrap_or(current_type);
    let discount_value = payload.discount_value.unwrap_or(existing.discount_value);
    let min_amount = payload.min_amount.unwrap_or(existing.min_amount);
    validate_rules(discount_type, discount_value, min_amount)?;

    let mut active: ActiveModel = existing.into();
    if let Some(code) = payload.code {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(AppError::bad_request("優惠碼不能為空"));
        }
        active.code = Set(code);
    }
    active.discount_type = Set(discount_type.as_str().to_string());
    active.discount_value = Set(discount_value);
    active.min_amount = Set(min_amount);
    if let Some(expires_at) = payload.expires_at {
        active.expires_at = Set(expires_at);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }

    let coupon = active
        .update(&state.orm)
        .await
        .map_err(|e| AppError::from_orm_with_conflict(e, "優惠碼已存在"))?;

    audit::record(
        state,
        admin,
        "coupon_update",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon updated",
        coupon_from_entity(coupon)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Coupons::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到優惠碼"));
    }

    audit::record(
        state,
        admin,
        "coupon_delete",
        "coupons",
        serde_json::json!({ "coupon_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_rules(discount_type: DiscountType, value: i64, min_amount: i64) -> AppResult<()> {
    match discount_type {
        DiscountType::Percentage if !(1..=100).contains(&value) => {
            Err(AppError::bad_request("折扣百分比必須介於 1 到 100"))
        }
        DiscountType::Fixed if value <= 0 => Err(AppError::bad_request("折扣金額必須大於 0")),
        _ if min_amount < 0 => Err(AppError::bad_request("最低消費金額不可為負數")),
        _ => Ok(()),
    }
}

fn coupon_from_entity(model: CouponModel) -> AppResult<Coupon> {
    let discount_type = model
        .discount_type
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Coupon {
        id: model.id,
        code: model.code,
        discount_type,
        discount_value: model.discount_value,
        min_amount: model.min_amount,
        expires_at: model.expires_at,
        is_active: model.is_active,
        created_at: model.created_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn coupon(discount_type: DiscountType, value: i64, min_amount: i64) -> Coupon {
        Coupon {
            id: 1,
            code: "TEST".into(),
            discount_type,
            discount_value: value,
            min_amount,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_coupon_at_minimum_applies() {
        let c = coupon(DiscountType::Percentage, 10, 500);
        let quote = evaluate(&c, 500, Utc::now()).expect("coupon applies");
        assert_eq!(quote.discount, 50);
        assert_eq!(quote.final_amount, 450);
    }

    #[test]
    fn percentage_coupon_below_minimum_is_rejected() {
        let c = coupon(DiscountType::Percentage, 10, 500);
        assert_eq!(
            evaluate(&c, 499, Utc::now()),
            Err(CouponRejection::BelowMinimum { minimum: 500 })
        );
    }

    #[test]
    fn percentage_rounds_down() {
        assert_eq!(discount_for(DiscountType::Percentage, 15, 999), 149);
    }

    #[test]
    fn fixed_discount_clamps_to_subtotal() {
        let c = coupon(DiscountType::Fixed, 50, 0);
        let quote = evaluate(&c, 30, Utc::now()).expect("coupon applies");
        assert_eq!(quote.discount, 30);
        assert_eq!(quote.final_amount, 0);
    }

    #[test]
    fn expired_coupon_is_rejected_even_when_active() {
        let mut c = coupon(DiscountType::Fixed, 50, 0);
        c.expires_at = Some(Utc::now() - Duration::hours(1));
        assert_eq!(evaluate(&c, 1000, Utc::now()), Err(CouponRejection::Expired));
    }

    #[test]
    fn future_expiry_is_accepted() {
        let mut c = coupon(DiscountType::Fixed, 50, 0);
        c.expires_at = Some(Utc::now() + Duration::days(1));
        assert!(evaluate(&c, 1000, Utc::now()).is_ok());
    }

    #[test]
    fn inactive_is_checked_before_expiry() {
        let mut c = coupon(DiscountType::Fixed, 50, 0);
        c.is_active = false;
        c.expires_at = Some(Utc::now() - Duration::hours(1));
        assert_eq!(evaluate(&c, 1000, Utc::now()), Err(CouponRejection::Inactive));
    }

    #[test]
    fn rejection_maps_to_http_errors() {
        assert!(matches!(
            AppError::from(CouponRejection::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(CouponRejection::Expired),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn rule_validation_bounds_percentages() {
        assert!(validate_rules(DiscountType::Percentage, 0, 0).is_err());
        assert!(validate_rules(DiscountType::Percentage, 101, 0).is_err());
        assert!(validate_rules(DiscountType::Percentage, 100, 0).is_ok());
        assert!(validate_rules(DiscountType::Fixed, 0, 0).is_err());
        assert!(validate_rules(DiscountType::Fixed, 10, -1).is_err());
    }
}
