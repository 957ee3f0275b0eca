use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryOrder, Set};

use crate::{
    audit,
    dto::admin::{SettingList, UpdateSettingRequest},
    entity::system_settings::{ActiveModel, Column, Entity as SystemSettings, Model as SettingModel},
    error::{AppError, AppResult},
    middleware::auth::AuthAdmin,
    models::SystemSetting,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const TELEGRAM_BOT_TOKEN: &str = "telegram_bot_token";
pub const TELEGRAM_CHAT_ID: &str = "telegram_chat_id";

const MAX_KEY_LEN: usize = 64;

pub async fn get_value(state: &AppState, key: &str) -> AppResult<Option<String>> {
    Ok(SystemSettings::find_by_id(key.to_string())
        .one(&state.orm)
        .await?
        .map(|setting| setting.value))
}

pub async fn list_settings(state: &AppState) -> AppResult<ApiResponse<SettingList>> {
    let items = SystemSettings::find()
        .order_by_asc(Column::Key)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(setting_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Settings",
        SettingList { items },
        Some(Meta::empty()),
    ))
}

pub async fn upsert_setting(
    state: &AppState,
    admin: &AuthAdmin,
    key: &str,
    payload: UpdateSettingRequest,
) -> AppResult<ApiResponse<SystemSetting>> {
    let key = key.trim();
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::bad_request("設定名稱無效"));
    }

    let model = ActiveModel {
        key: Set(key.to_string()),
        value: Set(payload.value.trim().to_string()),
        updated_at: Set(Utc::now()),
    };
    SystemSettings::insert(model)
        .on_conflict(
            OnConflict::column(Column::Key)
                .update_columns([Column::Value, Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(&state.orm)
        .await?;

    let saved = SystemSettings::find_by_id(key.to_string())
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("setting {key} vanished after upsert")))?;

    // Values may be secrets; only the key is recorded.
    audit::record(
        state,
        admin,
        "setting_update",
        "system_settings",
        serde_json::json!({ "key": key }),
    )
    .await;

    Ok(ApiResponse::success(
        "Setting saved",
        setting_from_entity(saved),
        Some(Meta::empty()),
    ))
}

fn setting_from_entity(model: SettingModel) -> SystemSetting {
    SystemSetting {
        key: model.key,
        value: model.value,
        updated_at: model.updated_at,
    }
}
