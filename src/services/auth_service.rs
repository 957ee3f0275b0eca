use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::{
    audit::log_audit,
    dto::auth::{Claims, LoginRequest, LoginResponse},
    entity::admins::{Column as AdminCol, Entity as Admins},
    error::{AppError, AppResult},
    models::AdminRole,
    response::{ApiResponse, Meta},
    state::AppState,
};

const TOKEN_TTL_HOURS: i64 = 24;
const INVALID_CREDENTIALS: &str = "帳號或密碼錯誤";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Sign an HS256 token carrying the admin id, username and role.
pub fn issue_token(
    secret: &str,
    admin_id: i64,
    username: &str,
    role: AdminRole,
) -> AppResult<(String, i64)> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: admin_id.to_string(),
        username: username.to_string(),
        role: role.as_str().to_string(),
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok((token, expiration.timestamp()))
}

pub async fn login_admin(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { username, password } = payload;
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("請輸入帳號與密碼"));
    }

    let admin = Admins::find()
        .filter(AdminCol::Username.eq(username))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password(&password, &admin.password_hash)? {
        tracing::info!(username, "admin login rejected");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let role: AdminRole = admin
        .role
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    let (token, expires_at) = issue_token(&state.config.jwt_secret, admin.id, &admin.username, role)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(admin.id),
        "admin_login",
        Some("admins"),
        Some(serde_json::json!({ "admin_id": admin.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            expires_at,
            username: admin.username,
            role: role.as_str().to_string(),
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    #[test]
    fn password_hash_verifies_only_the_same_password() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn issued_token_decodes_to_the_same_admin() {
        let (token, expires_at) = issue_token("test-secret", 42, "boss", AdminRole::Superadmin).unwrap();
        assert!(expires_at > Utc::now().timestamp());

        let admin = decode_token(&token, "test-secret").unwrap();
        assert_eq!(admin.admin_id, 42);
        assert_eq!(admin.username, "boss");
        assert_eq!(admin.role, AdminRole::Superadmin);

        assert!(decode_token(&token, "other-secret").is_err());
    }
}
