//! SQLite-backed storage.
//!
//! Implements every storage trait from `inbox_lens_core::store` on one
//! [`SqlitePool`]. Multi-row writes (embedding batches, embedding rebuilds)
//! run inside a single transaction; snapshot tables hold one JSON row that is
//! replaced in one statement.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use inbox_lens_core::embedding::{blob_to_vec, vec_to_blob};
use inbox_lens_core::models::{Categories, EmbeddingMap, Email};
use inbox_lens_core::projection::ProjectionSnapshot;
use inbox_lens_core::prompt::PromptCluster;
use inbox_lens_core::store::{
    CategoryStore, EmailStore, EmbeddingRecord, EmbeddingStamp, EmbeddingStore, ProjectionStore,
    PromptClusterStore,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_email(row: &SqliteRow) -> Result<Email> {
    Ok(Email {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        body_is_html: row.try_get("body_is_html")?,
        date: row.try_get("date")?,
        from_address: row.try_get("from_address")?,
        message_id: row.try_get("message_id")?,
        in_reply_to: row.try_get("in_reply_to")?,
        references: row.try_get("refs")?,
        mailbox: row.try_get("mailbox")?,
    })
}

const EMAIL_COLUMNS: &str = "id, subject, body, body_is_html, date, from_address, \
                             message_id, in_reply_to, refs, mailbox";

async fn insert_embedding<'e, E>(executor: E, record: &EmbeddingRecord, now: i64) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO embeddings (email_id, model, dims, content_hash, created_at, vector)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(email_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            content_hash = excluded.content_hash,
            created_at = excluded.created_at,
            vector = excluded.vector
        "#,
    )
    .bind(&record.email_id)
    .bind(&record.model)
    .bind(record.vector.len() as i64)
    .bind(&record.content_hash)
    .bind(now)
    .bind(vec_to_blob(&record.vector))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl EmailStore for SqliteStore {
    async fn upsert_emails(&self, emails: &[Email]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for email in emails {
            sqlx::query(
                r#"
                INSERT INTO emails (id, subject, body, body_is_html, date, date_ms,
                                    from_address, message_id, in_reply_to, refs, mailbox)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    subject = excluded.subject,
                    body = excluded.body,
                    body_is_html = excluded.body_is_html,
                    date = excluded.date,
                    date_ms = excluded.date_ms,
                    from_address = excluded.from_address,
                    message_id = excluded.message_id,
                    in_reply_to = excluded.in_reply_to,
                    refs = excluded.refs,
                    mailbox = excluded.mailbox
                "#,
            )
            .bind(&email.id)
            .bind(&email.subject)
            .bind(&email.body)
            .bind(email.body_is_html)
            .bind(&email.date)
            .bind(email.timestamp_millis())
            .bind(&email.from_address)
            .bind(&email.message_id)
            .bind(&email.in_reply_to)
            .bind(&email.references)
            .bind(&email.mailbox)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(emails.len())
    }

    async fn list_emails(&self) -> Result<Vec<Email>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY rowid"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_email).collect()
    }

    async fn get_email(&self, id: &str) -> Result<Option<Email>> {
        let row = sqlx::query(&format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_email).transpose()
    }

    async fn count_emails(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

#[async_trait]
impl EmbeddingStore for SqliteStore {
    async fn put_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for record in records {
            insert_embedding(&mut *tx, record, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM embeddings")
            .execute(&mut *tx)
            .await?;
        for record in records {
            insert_embedding(&mut *tx, record, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_embeddings(&self) -> Result<EmbeddingMap> {
        let rows = sqlx::query("SELECT email_id, vector FROM embeddings")
            .fetch_all(&self.pool)
            .await?;
        let mut map = EmbeddingMap::new();
        for row in rows {
            let id: String = row.try_get("email_id")?;
            let blob: Vec<u8> = row.try_get("vector")?;
            map.insert(id, blob_to_vec(&blob));
        }
        Ok(map)
    }

    async fn embedding_stamps(&self) -> Result<BTreeMap<String, EmbeddingStamp>> {
        let rows = sqlx::query("SELECT email_id, model, content_hash FROM embeddings")
            .fetch_all(&self.pool)
            .await?;
        let mut stamps = BTreeMap::new();
        for row in rows {
            stamps.insert(
                row.try_get("email_id")?,
                EmbeddingStamp {
                    model: row.try_get("model")?,
                    content_hash: row.try_get("content_hash")?,
                },
            );
        }
        Ok(stamps)
    }

    async fn count_embeddings(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

async fn load_snapshot<T: serde::de::DeserializeOwned>(
    pool: &SqlitePool,
    table: &str,
) -> Result<Option<T>> {
    let json: Option<String> =
        sqlx::query_scalar(&format!("SELECT snapshot_json FROM {table} WHERE id = 1"))
            .fetch_optional(pool)
            .await?;
    json.map(|j| {
        serde_json::from_str(&j).with_context(|| format!("Corrupt snapshot in table {table}"))
    })
    .transpose()
}

async fn save_snapshot<T: serde::Serialize + Sync>(
    pool: &SqlitePool,
    table: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_string(value)?;
    sqlx::query(&format!(
        "INSERT INTO {table} (id, snapshot_json, updated_at) VALUES (1, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             snapshot_json = excluded.snapshot_json,
             updated_at = excluded.updated_at"
    ))
    .bind(json)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl CategoryStore for SqliteStore {
    async fn load_categories(&self) -> Result<Option<Categories>> {
        load_snapshot(&self.pool, "categories").await
    }

    async fn replace_categories(&self, categories: &Categories) -> Result<()> {
        save_snapshot(&self.pool, "categories", categories).await
    }
}

#[async_trait]
impl ProjectionStore for SqliteStore {
    async fn load_projection(&self) -> Result<Option<ProjectionSnapshot>> {
        load_snapshot(&self.pool, "projection").await
    }

    async fn save_projection(&self, snapshot: &ProjectionSnapshot) -> Result<()> {
        save_snapshot(&self.pool, "projection", snapshot).await
    }
}

#[async_trait]
impl PromptClusterStore for SqliteStore {
    async fn list_prompt_clusters(&self) -> Result<BTreeMap<String, PromptCluster>> {
        let rows = sqlx::query("SELECT slug, cluster_json FROM prompt_clusters")
            .fetch_all(&self.pool)
            .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let slug: String = row.try_get("slug")?;
            let json: String = row.try_get("cluster_json")?;
            let cluster: PromptCluster = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt prompt cluster '{slug}'"))?;
            out.insert(slug, cluster);
        }
        Ok(out)
    }

    async fn get_prompt_cluster(&self, slug: &str) -> Result<Option<PromptCluster>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT cluster_json FROM prompt_clusters WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        json.map(|j| {
            serde_json::from_str(&j).with_context(|| format!("Corrupt prompt cluster '{slug}'"))
        })
        .transpose()
    }

    async fn put_prompt_cluster(&self, slug: &str, cluster: &PromptCluster) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prompt_clusters (slug, cluster_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                cluster_json = excluded.cluster_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slug)
        .bind(serde_json::to_string(cluster)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_prompt_cluster(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM prompt_clusters WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
