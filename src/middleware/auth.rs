use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::{dto::auth::Claims, error::AppError, models::AdminRole, state::AppState};

#[derive(Debug, Clone)]
pub struct AuthAdmin {
    pub admin_id: i64,
    pub username: String,
    pub role: AdminRole,
}

pub fn ensure_role(admin: &AuthAdmin, role: AdminRole) -> Result<(), AppError> {
    if admin.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_superadmin(admin: &AuthAdmin) -> Result<(), AppError> {
    ensure_role(admin, AdminRole::Superadmin)
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthAdmin, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("登入已過期或憑證無效".into()))?;

    let admin_id = decoded
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized("憑證內容無效".into()))?;
    let role = decoded
        .claims
        .role
        .parse::<AdminRole>()
        .map_err(|_| AppError::Unauthorized("憑證內容無效".into()))?;

    Ok(AuthAdmin {
        admin_id,
        username: decoded.claims.username,
        role,
    })
}

impl FromRequestParts<AppState> for AuthAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("請先登入".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Authorization 標頭無效".into()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Authorization 格式錯誤".into()))?;

        decode_token(token, &state.config.jwt_secret)
    }
}
