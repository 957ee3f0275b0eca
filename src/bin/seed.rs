use storefront_api::{
    config::AppConfig,
    db::{DbPool, create_pool, run_migrations},
    models::{AdminRole, DiscountType, ProductCategory},
    services::{auth_service::hash_password, setting_service},
};

struct SeedProduct {
    name: &'static str,
    category: ProductCategory,
    brand: &'static str,
    price: i64,
    stock: i32,
    coupon_excluded: bool,
    variants: &'static [(&'static str, &'static str, i32, i64)],
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "RELX 悅刻 五代主機",
        category: ProductCategory::Host,
        brand: "RELX",
        price: 890,
        stock: 0,
        coupon_excluded: false,
        variants: &[
            ("color", "曜石黑", 12, 0),
            ("color", "冰川銀", 8, 0),
            ("color", "玫瑰金", 5, 50),
        ],
    },
    SeedProduct {
        name: "RELX 悅刻 煙彈（三入）",
        category: ProductCategory::Cartridge,
        brand: "RELX",
        price: 300,
        stock: 0,
        coupon_excluded: false,
        variants: &[
            ("flavor", "薄荷", 30, 0),
            ("flavor", "西瓜", 20, 0),
            ("flavor", "葡萄", 3, 0),
        ],
    },
    SeedProduct {
        name: "SP2S 思博瑞 拋棄式",
        category: ProductCategory::Disposable,
        brand: "SP2S",
        price: 450,
        stock: 40,
        coupon_excluded: true,
        variants: &[],
    },
    SeedProduct {
        name: "尼古丁鹽煙油 30ml",
        category: ProductCategory::Oil,
        brand: "",
        price: 350,
        stock: 25,
        coupon_excluded: false,
        variants: &[],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let username = std::env::var("SEED_ADMIN_USERNAME").unwrap_or_else(|_| "owner".to_string());
    let password = std::env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "change-me-now".to_string());
    let admin_id = ensure_admin(&pool, &username, &password, AdminRole::Superadmin).await?;

    let created = seed_products(&pool).await?;
    seed_coupons(&pool).await?;
    seed_announcements(&pool).await?;
    seed_settings(&pool).await?;

    println!("Seed completed. Superadmin '{username}' (id {admin_id}), {created} new products");
    Ok(())
}

async fn ensure_admin(
    pool: &DbPool,
    username: &str,
    password: &str,
    role: AdminRole,
) -> anyhow::Result<i64> {
    let password_hash = hash_password(password)?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO admins (username, password_hash, role)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (username) DO UPDATE SET role = excluded.role
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn seed_products(pool: &DbPool) -> anyhow::Result<usize> {
    let mut created = 0;
    for product in PRODUCTS {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE name = ?1")
            .bind(product.name)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        let (product_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO products (name, category, brand, price, stock, coupon_excluded)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id
            "#,
        )
        .bind(product.name)
        .bind(product.category.as_str())
        .bind(product.brand)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.coupon_excluded)
        .fetch_one(&mut *tx)
        .await?;

        for (variant_type, variant_value, stock, price_delta) in product.variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (product_id, variant_type, variant_value, stock, price_delta)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(product_id)
            .bind(*variant_type)
            .bind(*variant_value)
            .bind(*stock)
            .bind(*price_delta)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        created += 1;
    }
    Ok(created)
}

async fn seed_coupons(pool: &DbPool) -> anyhow::Result<()> {
    let coupons = [
        ("SAVE50", DiscountType::Fixed, 50, 500),
        ("WELCOME10", DiscountType::Percentage, 10, 0),
    ];
    for (code, discount_type, value, min_amount) in coupons {
        sqlx::query(
            r#"
            INSERT INTO coupons (code, discount_type, discount_value, min_amount)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(code)
        .bind(discount_type.as_str())
        .bind(value)
        .bind(min_amount)
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn seed_announcements(pool: &DbPool) -> anyhow::Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM announcements")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }
    for (sort_order, content) in ["全館滿 NT$500 折 NT$50，結帳輸入 SAVE50", "超商取貨 2-3 天送達"]
        .into_iter()
        .enumerate()
    {
        sqlx::query("INSERT INTO announcements (content, sort_order) VALUES (?1, ?2)")
            .bind(content)
            .bind(sort_order as i32)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Empty placeholders so the keys show up in the admin settings list.
async fn seed_settings(pool: &DbPool) -> anyhow::Result<()> {
    for key in [setting_service::TELEGRAM_BOT_TOKEN, setting_service::TELEGRAM_CHAT_ID] {
        sqlx::query("INSERT INTO system_settings (key, value) VALUES (?1, '') ON CONFLICT (key) DO NOTHING")
            .bind(key)
            .execute(pool)
            .await?;
    }
    Ok(())
}
