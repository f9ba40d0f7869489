//! # Database Migration Support
//!
//! The order schema ships as embedded sqlx migrations from `migrations/`.
//!
//! ```rust,ignore
//! #[sqlx::test(migrator = "order_stream::database::migrator::MIGRATOR")]
//! async fn test_something(pool: PgPool) { /* ... */ }
//! ```

use sqlx::PgPool;
use tracing::info;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub type MigrationResult<T> = Result<T, sqlx::migrate::MigrateError>;

/// Apply any migrations the database has not seen yet
pub async fn run_migrations(pool: &PgPool) -> MigrationResult<()> {
    info!(
        migrations = MIGRATOR.iter().count(),
        "🗄️ Running database migrations"
    );
    MIGRATOR.run(pool).await?;
    info!("✅ Database migrations complete");
    Ok(())
}
