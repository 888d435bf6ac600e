use crate::error::FeedbackError;
use crate::{FeedbackLabel, FeedbackRow, SourceCitation};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

/// Append-only log of user ratings. Rows are never updated or deleted.
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub async fn open(path: &Path) -> Result<Self, FeedbackError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// A private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, FeedbackError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection that is never recycled, or the database vanishes with it.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), FeedbackError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources_json TEXT NOT NULL,
                label TEXT NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_label ON feedback(label)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_positive(
        &self,
        query: &str,
        answer: &str,
        sources: &[SourceCitation],
    ) -> Result<FeedbackRow, FeedbackError> {
        self.record(query, answer, sources, FeedbackLabel::Yes, "")
            .await
    }

    pub async fn record_negative(
        &self,
        query: &str,
        answer: &str,
        sources: &[SourceCitation],
        comment: &str,
    ) -> Result<FeedbackRow, FeedbackError> {
        self.record(query, answer, sources, FeedbackLabel::No, comment)
            .await
    }

    pub async fn record(
        &self,
        query: &str,
        answer: &str,
        sources: &[SourceCitation],
        label: FeedbackLabel,
        comment: &str,
    ) -> Result<FeedbackRow, FeedbackError> {
        let row = FeedbackRow {
            id: Uuid::new_v4(),
            query: query.to_string(),
            answer: answer.to_string(),
            sources: sources.to_vec(),
            label,
            comment: comment.to_string(),
            created_at: Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO feedback (id, query, answer, sources_json, label, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id.to_string())
        .bind(&row.query)
        .bind(&row.answer)
        .bind(serde_json::to_string(&row.sources)?)
        .bind(row.label.as_str())
        .bind(&row.comment)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %row.id, label = %row.label, "feedback recorded");
        Ok(row)
    }

    /// Rows with `label` in insertion order.
    pub async fn rows_with_label(
        &self,
        label: FeedbackLabel,
    ) -> Result<Vec<FeedbackRow>, FeedbackError> {
        let rows = sqlx::query(
            "SELECT id, query, answer, sources_json, label, comment, created_at
             FROM feedback WHERE label = ? ORDER BY created_at, rowid",
        )
        .bind(label.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }

    pub async fn count(&self) -> Result<i64, FeedbackError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_feedback(row: &SqliteRow) -> Result<FeedbackRow, FeedbackError> {
    let id: String = row.try_get("id")?;
    let sources_json: String = row.try_get("sources_json")?;
    let label: String = row.try_get("label")?;

    Ok(FeedbackRow {
        id: Uuid::parse_str(&id)
            .map_err(|error| FeedbackError::Database(sqlx::Error::Decode(Box::new(error))))?,
        query: row.try_get("query")?,
        answer: row.try_get("answer")?,
        sources: serde_json::from_str(&sources_json)?,
        label: label.parse()?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}
