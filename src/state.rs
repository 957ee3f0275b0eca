use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn},
    notifier::TelegramNotifier,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub notifier: TelegramNotifier,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let notifier =
            TelegramNotifier::new(&config.telegram_api_base, config.notify_timeout_secs)?;
        Ok(Self {
            orm: create_orm_conn(&pool),
            pool,
            config: Arc::new(config),
            notifier,
        })
    }
}
