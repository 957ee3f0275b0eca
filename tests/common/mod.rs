#![allow(dead_code)]

use storefront_api::{
    config::{AppConfig, Environment},
    db::{create_pool, run_migrations},
    middleware::auth::AuthAdmin,
    models::AdminRole,
    services::auth_service::hash_password,
    state::AppState,
};

pub const JWT_SECRET: &str = "test-secret";

pub fn test_config(telegram_api_base: &str) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        env: Environment::Development,
        jwt_secret: JWT_SECRET.into(),
        telegram_api_base: telegram_api_base.into(),
        notify_timeout_secs: 2,
        cors_allowed_origins: Vec::new(),
    }
}

/// Fresh migrated in-memory database per test.
pub async fn setup_state() -> anyhow::Result<AppState> {
    setup_state_with_telegram("http://127.0.0.1:9").await
}

pub async fn setup_state_with_telegram(telegram_api_base: &str) -> anyhow::Result<AppState> {
    let config = test_config(telegram_api_base);
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    AppState::new(pool, config)
}

pub async fn insert_product(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
    coupon_excluded: bool,
) -> anyhow::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO products (name, category, brand, price, stock, coupon_excluded)
        VALUES (?1, 'cartridge', 'RELX', ?2, ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(price)
    .bind(stock)
    .bind(coupon_excluded)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

pub async fn insert_variant(
    state: &AppState,
    product_id: i64,
    value: &str,
    stock: i32,
    price_delta: i64,
) -> anyhow::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO product_variants (product_id, variant_type, variant_value, stock, price_delta)
        VALUES (?1, 'flavor', ?2, ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(product_id)
    .bind(value)
    .bind(stock)
    .bind(price_delta)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

pub async fn insert_admin(
    state: &AppState,
    username: &str,
    password: &str,
    role: AdminRole,
) -> anyhow::Result<AuthAdmin> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO admins (username, password_hash, role) VALUES (?1, ?2, ?3) RETURNING id",
    )
    .bind(username)
    .bind(hash_password(password)?)
    .bind(role.as_str())
    .fetch_one(&state.pool)
    .await?;
    Ok(AuthAdmin {
        admin_id: id,
        username: username.into(),
        role,
    })
}

pub async fn set_setting(state: &AppState, key: &str, value: &str) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO system_settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&state.pool)
    .await?;
    Ok(())
}
