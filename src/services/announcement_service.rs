use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::{
    audit,
    dto::admin::{AnnouncementList, CreateAnnouncementRequest, UpdateAnnouncementRequest},
    entity::announcements::{ActiveModel, Column, Entity as Announcements, Model as AnnouncementModel},
    error::{AppError, AppResult},
    middleware::auth::AuthAdmin,
    models::Announcement,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Active announcements for the storefront banner.
pub async fn list_active(state: &AppState) -> AppResult<ApiResponse<AnnouncementList>> {
    let items = Announcements::find()
        .filter(Column::IsActive.eq(true))
        .order_by_asc(Column::SortOrder)
        .order_by_asc(Column::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(announcement_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Announcements",
        AnnouncementList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_all(state: &AppState) -> AppResult<ApiResponse<AnnouncementList>> {
    let items = Announcements::find()
        .order_by_asc(Column::SortOrder)
        .order_by_asc(Column::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(announcement_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Announcements",
        AnnouncementList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_announcement(
    state: &AppState,
    admin: &AuthAdmin,
    payload: CreateAnnouncementRequest,
) -> AppResult<ApiResponse<Announcement>> {
    let content = payload.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::bad_request("公告內容不能為空"));
    }

    let now = Utc::now();
    let announcement = ActiveModel {
        id: NotSet,
        content: Set(content),
        is_active: Set(payload.is_active),
        sort_order: Set(payload.sort_order),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        admin,
        "announcement_create",
        "announcements",
        serde_json::json!({ "announcement_id": announcement.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Announcement created",
        announcement_from_entity(announcement),
        Some(Meta::empty()),
    ))
}

pub async fn update_announcement(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
    payload: UpdateAnnouncementRequest,
) -> AppResult<ApiResponse<Announcement>> {
    let existing = Announcements::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("找不到公告"))?;

    let mut active: ActiveModel = existing.into();
    if let Some(content) = payload.content {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::bad_request("公告內容不能為空"));
        }
        active.content = Set(content);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(sort_order) = payload.sort_order {
        active.sort_order = Set(sort_order);
    }
    active.updated_at = Set(Utc::now());
    let announcement = active.update(&state.orm).await?;

    audit::record(
        state,
        admin,
        "announcement_update",
        "announcements",
        serde_json::json!({ "announcement_id": announcement.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Announcement updated",
        announcement_from_entity(announcement),
        Some(Meta::empty()),
    ))
}

pub async fn delete_announcement(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Announcements::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到公告"));
    }

    audit::record(
        state,
        admin,
        "announcement_delete",
        "announcements",
        serde_json::json!({ "announcement_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn announcement_from_entity(model: AnnouncementModel) -> Announcement {
    Announcement {
        id: model.id,
        content: model.content,
        is_active: model.is_active,
        sort_order: model.sort_order,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
