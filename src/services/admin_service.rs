use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};

use crate::{
    audit,
    dto::admin::{AdminList, CreateAdminRequest},
    entity::admins::{ActiveModel as AdminActive, Column as AdminCol, Entity as Admins, Model as AdminModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthAdmin, ensure_superadmin},
    models::Admin,
    response::{ApiResponse, Meta},
    services::auth_service::hash_password,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub async fn list_admins(state: &AppState, admin: &AuthAdmin) -> AppResult<ApiResponse<AdminList>> {
    ensure_superadmin(admin)?;
    let items = Admins::find()
        .order_by_asc(AdminCol::Id)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(admin_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Admins",
        AdminList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_admin(
    state: &AppState,
    admin: &AuthAdmin,
    payload: CreateAdminRequest,
) -> AppResult<ApiResponse<Admin>> {
    ensure_superadmin(admin)?;

    let username = payload.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::bad_request("帳號不能為空"));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("密碼至少需要 8 個字元"));
    }

    let created = AdminActive {
        id: NotSet,
        username: Set(username),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(payload.role.as_str().to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::from_orm_with_conflict(e, "帳號已存在"))?;

    audit::record(
        state,
        admin,
        "admin_create",
        "admins",
        serde_json::json!({ "admin_id": created.id, "role": created.role }),
    )
    .await;

    Ok(ApiResponse::success(
        "Admin created",
        admin_from_entity(created)?,
        Some(Meta::empty()),
    ))
}

pub async fn delete_admin(
    state: &AppState,
    admin: &AuthAdmin,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_superadmin(admin)?;
    if id == admin.admin_id {
        return Err(AppError::bad_request("不能刪除自己的帳號"));
    }

    let result = Admins::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("找不到管理員"));
    }

    audit::record(
        state,
        admin,
        "admin_delete",
        "admins",
        serde_json::json!({ "admin_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn admin_from_entity(model: AdminModel) -> AppResult<Admin> {
    let role = model
        .role
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Admin {
        id: model.id,
        username: model.username,
        role,
        created_at: model.created_at,
    })
}
