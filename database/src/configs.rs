use crate::{query_error, Database};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::{
    ConfigId, ConfigStore, CoreError, NewSourceConfig, RankingWindow, SourceConfig,
    SourceConfigUpdate,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

const SELECT_CONFIG: &str = "SELECT id, subreddit_name, filter_type, frequency, is_active, \
     last_check, created_at FROM subreddit_configs";

/// Trims whitespace and an optional `r/` prefix, then checks the name is a
/// plausible subreddit.
pub fn normalize_subreddit_name(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    let name = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if name.is_empty() {
        return Err(CoreError::InvalidInput {
            message: "subreddit_name must not be empty".to_string(),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::InvalidInput {
            message: format!("'{}' is not a valid subreddit name", raw),
        });
    }
    Ok(name.to_string())
}

fn validate_frequency(frequency_minutes: u32) -> Result<(), CoreError> {
    if frequency_minutes == 0 {
        return Err(CoreError::InvalidInput {
            message: "frequency must be at least one minute".to_string(),
        });
    }
    Ok(())
}

fn config_from_row(row: &SqliteRow) -> Result<SourceConfig, sqlx::Error> {
    let filter_type: String = row.try_get("filter_type")?;
    let frequency: i64 = row.try_get("frequency")?;

    Ok(SourceConfig {
        id: row.try_get("id")?,
        subreddit_name: row.try_get("subreddit_name")?,
        ranking_window: RankingWindow::parse_lenient(&filter_type),
        frequency_minutes: u32::try_from(frequency)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        is_active: row.try_get("is_active")?,
        last_check: row.try_get::<Option<DateTime<Utc>>, _>("last_check")?,
        created_at: row.try_get("created_at")?,
    })
}

fn configs_from_rows(rows: &[SqliteRow]) -> Result<Vec<SourceConfig>, CoreError> {
    rows.iter()
        .map(|row| config_from_row(row).map_err(query_error))
        .collect()
}

#[async_trait]
impl ConfigStore for Database {
    async fn list_configs(&self) -> Result<Vec<SourceConfig>, CoreError> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_CONFIG))
            .fetch_all(self.pool()?)
            .await
            .map_err(query_error)?;
        configs_from_rows(&rows)
    }

    async fn list_active_configs(&self) -> Result<Vec<SourceConfig>, CoreError> {
        let rows = sqlx::query(&format!("{} WHERE is_active = 1 ORDER BY id", SELECT_CONFIG))
            .fetch_all(self.pool()?)
            .await
            .map_err(query_error)?;
        configs_from_rows(&rows)
    }

    async fn get_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_CONFIG))
            .bind(id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(query_error)?;

        row.as_ref()
            .map(config_from_row)
            .transpose()
            .map_err(query_error)
    }

    async fn create_config(&self, new: &NewSourceConfig) -> Result<SourceConfig, CoreError> {
        let subreddit_name = normalize_subreddit_name(&new.subreddit_name)?;
        validate_frequency(new.frequency_minutes)?;

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO subreddit_configs \
             (subreddit_name, filter_type, frequency, is_active, last_check, created_at) \
             VALUES (?, ?, ?, 1, NULL, ?)",
        )
        .bind(&subreddit_name)
        .bind(new.ranking_window.as_str())
        .bind(i64::from(new.frequency_minutes))
        .bind(created_at)
        .execute(self.pool()?)
        .await
        .map_err(query_error)?;

        let id = result.last_insert_rowid();
        info!(
            "Created config {} for r/{} ({}, every {} min)",
            id, subreddit_name, new.ranking_window, new.frequency_minutes
        );

        Ok(SourceConfig {
            id,
            subreddit_name,
            ranking_window: new.ranking_window,
            frequency_minutes: new.frequency_minutes,
            is_active: true,
            last_check: None,
            created_at,
        })
    }

    async fn update_config(
        &self,
        id: ConfigId,
        update: &SourceConfigUpdate,
    ) -> Result<Option<SourceConfig>, CoreError> {
        validate_frequency(update.frequency_minutes)?;

        let result =
            sqlx::query("UPDATE subreddit_configs SET filter_type = ?, frequency = ? WHERE id = ?")
                .bind(update.ranking_window.as_str())
                .bind(i64::from(update.frequency_minutes))
                .bind(id)
                .execute(self.pool()?)
                .await
                .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        debug!("Updated config {}", id);
        self.get_config(id).await
    }

    async fn toggle_config(&self, id: ConfigId) -> Result<Option<SourceConfig>, CoreError> {
        let result = sqlx::query("UPDATE subreddit_configs SET is_active = NOT is_active WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        let config = self.get_config(id).await?;
        if let Some(config) = &config {
            info!(
                "Config {} for r/{} is now {}",
                id,
                config.subreddit_name,
                if config.is_active { "active" } else { "inactive" }
            );
        }
        Ok(config)
    }

    async fn delete_config(&self, id: ConfigId) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM subreddit_configs WHERE id = ?")
            .bind(id)
            .execute(self.pool()?)
            .await
            .map_err(query_error)?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted config {}", id);
        }
        Ok(deleted)
    }

    async fn touch_last_check(&self, id: ConfigId, at: DateTime<Utc>) -> Result<(), CoreError> {
        sqlx::query("UPDATE subreddit_configs SET last_check = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(self.pool()?)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}
