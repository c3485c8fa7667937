//! PostgreSQL content store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_query::{Alias, Asterisk, Expr, Order, PostgresQueryBuilder, Query, SelectStatement};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{ContentStore, EnvelopeFilter, StoreTransaction, StoredRecord, StreamFilter};
use crate::container::ContainerRef;
use crate::models::ContentEnvelope;

const ENVELOPE_TABLE: &str = "content";

const ENVELOPE_COLUMNS: [&str; 13] = [
    "id",
    "object_type",
    "object_id",
    "container_id",
    "visibility",
    "title",
    "created_by",
    "created_at",
    "updated_by",
    "updated_at",
    "pinned",
    "archived",
    "stream_channel",
];

const SELECT_ENVELOPE: &str = "SELECT id, object_type, object_id, container_id, visibility, title, created_by, created_at, updated_by, updated_at, pinned, archived, stream_channel FROM content";

/// Row type for reading envelopes (container stored as a bare UUID).
#[derive(sqlx::FromRow)]
struct EnvelopeRow {
    id: Uuid,
    object_type: Option<String>,
    object_id: Option<i64>,
    container_id: Uuid,
    visibility: i16,
    title: Option<String>,
    created_by: Option<Uuid>,
    created_at: i64,
    updated_by: Option<Uuid>,
    updated_at: i64,
    pinned: bool,
    archived: bool,
    stream_channel: Option<String>,
}

impl From<EnvelopeRow> for ContentEnvelope {
    fn from(row: EnvelopeRow) -> Self {
        Self {
            id: row.id,
            object_id: row.object_id,
            object_type: row.object_type,
            container: Some(ContainerRef(row.container_id)),
            visibility: row.visibility,
            title: row.title,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
            pinned: row.pinned,
            archived: row.archived,
            stream_channel: row.stream_channel,
        }
    }
}

/// Add WHERE conditions for an envelope filter.
fn apply_filter(query: &mut SelectStatement, filter: &EnvelopeFilter) {
    query.and_where(Expr::col(Alias::new("object_type")).eq(filter.object_type()));

    if let Some(container) = filter.container {
        query.and_where(Expr::col(Alias::new("container_id")).eq(container.0));
    }
    if let Some(visibility) = filter.visibility {
        query.and_where(Expr::col(Alias::new("visibility")).eq(visibility.as_i16()));
    }
    if let Some(created_by) = filter.created_by {
        query.and_where(Expr::col(Alias::new("created_by")).eq(created_by));
    }
    if let Some(pinned) = filter.pinned {
        query.and_where(Expr::col(Alias::new("pinned")).eq(pinned));
    }
    if let Some(archived) = filter.archived {
        query.and_where(Expr::col(Alias::new("archived")).eq(archived));
    }

    match &filter.stream {
        StreamFilter::Any => {}
        StreamFilter::Surfaced => {
            query.and_where(Expr::col(Alias::new("stream_channel")).is_not_null());
        }
        StreamFilter::Channel(channel) => {
            query.and_where(Expr::col(Alias::new("stream_channel")).eq(channel.as_str()));
        }
    }
}

/// Build the SELECT for an envelope query, newest first.
fn build_envelope_query(filter: &EnvelopeFilter) -> String {
    let mut query = Query::select();
    query.columns(ENVELOPE_COLUMNS.iter().map(|c| Alias::new(*c)));
    query.from(Alias::new(ENVELOPE_TABLE));
    apply_filter(&mut query, filter);

    query.order_by(Alias::new("created_at"), Order::Desc);
    query.order_by(Alias::new("id"), Order::Desc);

    if let Some(limit) = filter.limit {
        query.limit(limit);
    }
    if filter.offset > 0 {
        query.offset(filter.offset);
    }

    query.to_string(PostgresQueryBuilder)
}

/// Build a COUNT query for an envelope filter.
fn build_envelope_count(filter: &EnvelopeFilter) -> String {
    let mut query = Query::select();
    query.expr(Expr::col(Asterisk).count());
    query.from(Alias::new(ENVELOPE_TABLE));
    apply_filter(&mut query, filter);
    query.to_string(PostgresQueryBuilder)
}

/// Content store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn find_record(&self, object_type: &str, id: i64) -> Result<Option<StoredRecord>> {
        let record = sqlx::query_as::<_, StoredRecord>(
            "SELECT object_type, id, concrete_type, fields, created, changed FROM content_record WHERE object_type = $1 AND id = $2",
        )
        .bind(object_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch content record")?;

        Ok(record)
    }

    async fn find_records(&self, object_type: &str, ids: &[i64]) -> Result<Vec<StoredRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, StoredRecord>(
            "SELECT object_type, id, concrete_type, fields, created, changed FROM content_record WHERE object_type = $1 AND id = ANY($2)",
        )
        .bind(object_type)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch content records")?;

        Ok(records)
    }

    async fn find_envelope(
        &self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>> {
        let row = sqlx::query_as::<_, EnvelopeRow>(&format!(
            "{SELECT_ENVELOPE} WHERE object_type = $1 AND object_id = $2"
        ))
        .bind(object_type)
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch content envelope")?;

        Ok(row.map(ContentEnvelope::from))
    }

    async fn find_envelope_by_id(&self, id: Uuid) -> Result<Option<ContentEnvelope>> {
        let row = sqlx::query_as::<_, EnvelopeRow>(&format!("{SELECT_ENVELOPE} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch content envelope by id")?;

        Ok(row.map(ContentEnvelope::from))
    }

    async fn query_envelopes(&self, filter: &EnvelopeFilter) -> Result<Vec<ContentEnvelope>> {
        let sql = build_envelope_query(filter);
        debug!(sql = %sql, "envelope query");

        let rows = sqlx::query_as::<_, EnvelopeRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to query content envelopes")?;

        Ok(rows.into_iter().map(ContentEnvelope::from).collect())
    }

    async fn count_envelopes(&self, filter: &EnvelopeFilter) -> Result<i64> {
        let sql = build_envelope_count(filter);

        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .context("failed to count content envelopes")?;

        Ok(count)
    }

    async fn dangling_envelopes(&self, object_type: Option<&str>) -> Result<Vec<ContentEnvelope>> {
        let rows = sqlx::query_as::<_, EnvelopeRow>(
            r#"
            SELECT c.id, c.object_type, c.object_id, c.container_id, c.visibility, c.title,
                   c.created_by, c.created_at, c.updated_by, c.updated_at, c.pinned, c.archived,
                   c.stream_channel
            FROM content c
            LEFT JOIN content_record r ON r.object_type = c.object_type AND r.id = c.object_id
            WHERE r.id IS NULL AND ($1::VARCHAR IS NULL OR c.object_type = $1)
            ORDER BY c.created_at DESC, c.id DESC
            "#,
        )
        .bind(object_type)
        .fetch_all(&self.pool)
        .await
        .context("failed to list dangling content envelopes")?;

        Ok(rows.into_iter().map(ContentEnvelope::from).collect())
    }

    fn scheme(&self) -> &'static str {
        "postgres"
    }
}

/// Transaction over a [`PgContentStore`].
struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_record(
        &mut self,
        object_type: &str,
        concrete_type: &str,
        fields: &serde_json::Value,
    ) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO content_sequence (object_type, last_id)
            VALUES ($1, 1)
            ON CONFLICT (object_type) DO UPDATE SET last_id = content_sequence.last_id + 1
            RETURNING last_id
            "#,
        )
        .bind(object_type)
        .fetch_one(&mut *self.tx)
        .await
        .context("failed to allocate content record id")?;

        sqlx::query(
            r#"
            INSERT INTO content_record (object_type, id, concrete_type, fields, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(object_type)
        .bind(id)
        .bind(fields)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .context("failed to insert content record")?;

        Ok(id)
    }

    async fn update_record(
        &mut self,
        object_type: &str,
        id: i64,
        fields: &serde_json::Value,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE content_record SET fields = $1, changed = $2
            WHERE object_type = $3 AND id = $4
            "#,
        )
        .bind(fields)
        .bind(now)
        .bind(object_type)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .context("failed to update content record")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_record(&mut self, object_type: &str, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content_record WHERE object_type = $1 AND id = $2")
            .bind(object_type)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("failed to delete content record")?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_envelope(&mut self, envelope: &ContentEnvelope) -> Result<()> {
        let container = envelope
            .container
            .with_context(|| format!("content envelope {} has no container", envelope.id))?;

        sqlx::query(
            r#"
            INSERT INTO content (id, object_type, object_id, container_id, visibility, title,
                                 created_by, created_at, updated_by, updated_at, pinned, archived,
                                 stream_channel)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                object_type = EXCLUDED.object_type,
                object_id = EXCLUDED.object_id,
                container_id = EXCLUDED.container_id,
                visibility = EXCLUDED.visibility,
                title = EXCLUDED.title,
                created_by = EXCLUDED.created_by,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at,
                pinned = EXCLUDED.pinned,
                archived = EXCLUDED.archived,
                stream_channel = EXCLUDED.stream_channel
            "#,
        )
        .bind(envelope.id)
        .bind(envelope.object_type.as_deref())
        .bind(envelope.object_id)
        .bind(container.0)
        .bind(envelope.visibility)
        .bind(envelope.title.as_deref())
        .bind(envelope.created_by)
        .bind(envelope.created_at)
        .bind(envelope.updated_by)
        .bind(envelope.updated_at)
        .bind(envelope.pinned)
        .bind(envelope.archived)
        .bind(envelope.stream_channel.as_deref())
        .execute(&mut *self.tx)
        .await
        .context("failed to save content envelope")?;

        Ok(())
    }

    async fn delete_envelope(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("failed to delete content envelope")?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_envelope(
        &mut self,
        object_type: &str,
        object_id: i64,
    ) -> Result<Option<ContentEnvelope>> {
        let row = sqlx::query_as::<_, EnvelopeRow>(&format!(
            "{SELECT_ENVELOPE} WHERE object_type = $1 AND object_id = $2"
        ))
        .bind(object_type)
        .bind(object_id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("failed to fetch content envelope")?;

        Ok(row.map(ContentEnvelope::from))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("failed to roll back transaction")
    }
}
