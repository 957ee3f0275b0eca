use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::SqlErr;
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

const INTERNAL_MESSAGE: &str = "伺服器內部錯誤";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// Duplicate unique key; reported as a bad request.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("權限不足")]
    Forbidden,

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error: {0}")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map a unique-constraint violation to `Conflict`, keep anything else.
    pub fn from_orm_with_conflict(err: sea_orm::DbErr, message: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(message.to_string()),
            _ => AppError::OrmError(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

/// Detail of a server error, carried as a response extension and only
/// written to the body by [`expose_internal_detail`].
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

fn error_response(status: StatusCode, message: String, error: String) -> Response {
    let body = ApiResponse {
        message,
        data: Some(ErrorData { error }),
        meta: Some(Meta::empty()),
    };
    (status, axum::Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !status.is_server_error() {
            let message = self.to_string();
            return error_response(status, message.clone(), message);
        }

        tracing::error!(error = %self, "request failed");
        let mut response = error_response(
            status,
            INTERNAL_MESSAGE.to_string(),
            INTERNAL_MESSAGE.to_string(),
        );
        response
            .extensions_mut()
            .insert(InternalErrorDetail(self.to_string()));
        response
    }
}

/// Development-only layer: put the internal error detail back into 5xx bodies.
pub async fn expose_internal_detail(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let detail = response
        .extensions()
        .get::<InternalErrorDetail>()
        .map(|InternalErrorDetail(detail)| detail.clone());
    match detail {
        Some(detail) => error_response(response.status(), INTERNAL_MESSAGE.to_string(), detail),
        None => response,
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, body::to_bytes, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn failing_router() -> Router {
        Router::new().route(
            "/boom",
            get(|| async { Err::<(), _>(AppError::Internal(anyhow::anyhow!("disk on fire"))) }),
        )
    }

    async fn error_field(app: Router) -> String {
        let response = app
            .oneshot(axum::http::Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        body["data"]["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn internal_detail_is_hidden_without_the_development_layer() {
        assert_eq!(error_field(failing_router()).await, INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn development_layer_exposes_internal_detail() {
        let app = failing_router().layer(axum::middleware::from_fn(expose_internal_detail));
        assert!(error_field(app).await.contains("disk on fire"));
    }

    #[test]
    fn client_errors_map_to_expected_status() {
        assert_eq!(
            AppError::not_found("找不到商品").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("優惠碼已存在".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("未登入".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_errors_are_500() {
        let err = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
