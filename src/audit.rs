use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder, QuerySelect};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entity::audit_logs::{Column, Entity as AuditLogs, Model as AuditLogModel},
    error::AppResult,
    middleware::auth::AuthAdmin,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub admin_id: Option<i64>,
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogList {
    pub items: Vec<AuditLog>,
}

pub async fn log_audit(
    pool: &DbPool,
    admin_id: Option<i64>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (admin_id, action, resource, metadata)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(admin_id)
    .bind(action)
    .bind(resource)
    .bind(metadata.map(|m| m.to_string()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Record an admin action; a failed write is logged and never fails the caller.
pub async fn record(
    state: &AppState,
    admin: &AuthAdmin,
    action: &str,
    resource: &str,
    metadata: Value,
) {
    if let Err(err) = log_audit(
        &state.pool,
        Some(admin.admin_id),
        action,
        Some(resource),
        Some(metadata),
    )
    .await
    {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}

pub async fn list_audit_logs(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<AuditLogList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = AuditLogs::find().order_by_desc(Column::Id);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(audit_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Audit logs",
        AuditLogList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

fn audit_from_entity(model: AuditLogModel) -> AuditLog {
    AuditLog {
        id: model.id,
        admin_id: model.admin_id,
        action: model.action,
        resource: model.resource,
        metadata: model.metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: model.created_at,
    }
}
