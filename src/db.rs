use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    let migration_sql = include_str!("../migrations/0001_init.sql");

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = 'mm_ticket')",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        sqlx::raw_sql(migration_sql).execute(pool).await?;
        tracing::info!("database migrations completed successfully");
    } else {
        tracing::info!("database tables already exist, skipping migrations");
    }

    Ok(())
}
