use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

/// Build a pool for `url` with the sizing and timeouts from `config`
pub async fn connect_pool(url: &str, config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    debug!(
        max_connections = config.max_connections,
        acquire_timeout_seconds = config.acquire_timeout_seconds,
        "Connecting database pool"
    );
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(url)
        .await
}

/// Primary pool of the service, checked once before anything else starts
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = connect_pool(&config.url, config).await?;
        info!("🔌 Database pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool, sqlx::Error> {
        let health: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
