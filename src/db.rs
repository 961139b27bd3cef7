use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{error, info, warn};

use crate::{config::AppConfig, storage::Backend};

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = tokio::time::timeout(
        config.db_connect_timeout,
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(config.db_connect_timeout)
            .connect(&config.database_url),
    )
    .await
    .context("database connect timed out")?
    .context("connect to database")?;
    Ok(pool)
}

/// Picks the backend once: Postgres if reachable, otherwise the memory store.
pub async fn select_backend(config: &AppConfig) -> Backend {
    info!("connecting to database");
    match connect(config).await {
        Ok(pool) => {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                warn!(error = %e, "migration failed; continuing");
            }
            info!("database connected");
            Backend::Postgres(pool)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "database unavailable");
            warn!("serving from the in-memory store; data will be lost on restart");
            Backend::Memory
        }
    }
}
