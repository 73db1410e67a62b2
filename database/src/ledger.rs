use crate::{query_error, Database};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{CoreError, DedupLedger, DeliveryRecord};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
impl DedupLedger for Database {
    async fn is_duplicate(&self, post_id: &str) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM sent_posts WHERE post_id = ? LIMIT 1")
            .bind(post_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }

    async fn record(
        &self,
        post_id: &str,
        subreddit_name: &str,
    ) -> Result<DeliveryRecord, CoreError> {
        let record = DeliveryRecord {
            id: Uuid::new_v4(),
            post_id: post_id.to_string(),
            subreddit_name: subreddit_name.to_string(),
            sent_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO sent_posts (id, post_id, subreddit_name, sent_at) VALUES (?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.post_id)
        .bind(&record.subreddit_name)
        .bind(record.sent_at)
        .execute(self.pool()?)
        .await
        .map_err(query_error)?;

        debug!("Recorded delivery of {} from r/{}", post_id, subreddit_name);
        Ok(record)
    }

    async fn recent_deliveries(&self, limit: u32) -> Result<Vec<DeliveryRecord>, CoreError> {
        // rowid follows insertion order, which is delivery order
        let rows = sqlx::query(
            "SELECT id, post_id, subreddit_name, sent_at FROM sent_posts \
             ORDER BY rowid DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool()?)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(query_error)?;
                Ok(DeliveryRecord {
                    id: Uuid::parse_str(&id).map_err(|e| CoreError::Internal {
                        message: format!("corrupt delivery id {}: {}", id, e),
                    })?,
                    post_id: row.try_get("post_id").map_err(query_error)?,
                    subreddit_name: row.try_get("subreddit_name").map_err(query_error)?,
                    sent_at: row
                        .try_get::<DateTime<Utc>, _>("sent_at")
                        .map_err(query_error)?,
                })
            })
            .collect()
    }
}
