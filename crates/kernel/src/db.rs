//! Database connection pool management.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::Config;

/// Tables used by the PostgreSQL store and follow registry.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_sequence (
    object_type VARCHAR(64) PRIMARY KEY,
    last_id BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS content_record (
    object_type VARCHAR(64) NOT NULL,
    id BIGINT NOT NULL,
    concrete_type VARCHAR(64) NOT NULL,
    fields JSONB NOT NULL DEFAULT '{}'::jsonb,
    created BIGINT NOT NULL,
    changed BIGINT NOT NULL,
    PRIMARY KEY (object_type, id)
);

CREATE TABLE IF NOT EXISTS content (
    id UUID PRIMARY KEY,
    object_type VARCHAR(64),
    object_id BIGINT,
    container_id UUID NOT NULL,
    visibility SMALLINT NOT NULL DEFAULT 0 CHECK (visibility IN (0, 1, 2)),
    title VARCHAR(255),
    created_by UUID,
    created_at BIGINT NOT NULL,
    updated_by UUID,
    updated_at BIGINT NOT NULL,
    pinned BOOLEAN NOT NULL DEFAULT FALSE,
    archived BOOLEAN NOT NULL DEFAULT FALSE,
    stream_channel VARCHAR(64),
    UNIQUE (object_type, object_id)
);

CREATE INDEX IF NOT EXISTS content_container_idx ON content (container_id, created_at DESC);

CREATE TABLE IF NOT EXISTS user_follow (
    user_id UUID NOT NULL,
    object_type VARCHAR(64) NOT NULL,
    object_id BIGINT NOT NULL,
    created BIGINT NOT NULL,
    PRIMARY KEY (user_id, object_type, object_id)
);
"#;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Create the content tables if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to create content schema")?;

    info!("content schema ready");
    Ok(())
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
