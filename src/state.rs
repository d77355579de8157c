use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::auth::totp::Authenticator;
use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let pg = PgStore::connect(url, config.database_max_connections).await?;
                pg.migrate().await?;
                info!("connected to postgres, migrations applied");
                Arc::new(pg)
            }
            StoreBackend::Memory => {
                info!("using in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }

    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(self.config.mfa.issuer.clone())
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryStore::new()),
        )
    }
}
