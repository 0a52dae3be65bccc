use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect to the portal catalog and apply pending migrations.
#[tracing::instrument(skip(url), err)]
pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("connected to catalog database");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("catalog migrations applied");

    Ok(pool)
}
