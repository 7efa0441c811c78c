// SQLite 历史数据实现
//
// 时间统一以 UTC 毫秒整数存储，范围查询和去重判断都直接比较整数

use super::{HistoryRepository, HistoryStats};
use crate::error::{StoreError, StoreResult};
use crate::storage::models::*;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{info, warn};

const SELECT_COLUMNS: &str =
    "SELECT id, scholar_id, citation_count, timestamp_ms, source, created_at_ms FROM citation_history";

fn millis_to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Database(format!("无效的时间戳: {}", ms)))
}

fn row_to_entry(row: &SqliteRow) -> StoreResult<HistoryEntry> {
    let source: String = row.try_get("source")?;
    let source = DataSource::parse(&source).unwrap_or_else(|| {
        warn!("未知的数据来源 '{}'，按 automatic 处理", source);
        DataSource::Automatic
    });

    Ok(HistoryEntry {
        id: row.try_get("id")?,
        scholar_id: row.try_get("scholar_id")?,
        citation_count: row.try_get("citation_count")?,
        timestamp: millis_to_datetime(row.try_get("timestamp_ms")?)?,
        source,
        created_at: millis_to_datetime(row.try_get("created_at_ms")?)?,
    })
}

/// SQLite 数据库实现
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    /// 打开（或创建）SQLite 数据库
    pub async fn new(db_path: &str) -> StoreResult<Self> {
        info!("初始化 SQLite 历史数据库: {}", db_path);

        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .min_connections(1)
            .idle_timeout(std::time::Duration::from_secs(180))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await?;

        let repo = Self { pool };
        repo.initialize_tables().await?;

        Ok(repo)
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    // ========== 写入 ==========

    async fn insert_entry(&self, entry: &HistoryEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO citation_history (id, scholar_id, citation_count, timestamp_ms, source, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.scholar_id)
        .bind(entry.citation_count)
        .bind(entry.timestamp.timestamp_millis())
        .bind(entry.source.as_str())
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_citation_count(&self, entry_id: &str, citation_count: i64) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE citation_history SET citation_count = ? WHERE id = ?")
            .bind(citation_count)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ========== 查询 ==========

    async fn has_entry_near(
        &self,
        scholar_id: &str,
        timestamp: DateTime<Utc>,
        window_ms: i64,
    ) -> StoreResult<bool> {
        let ts = timestamp.timestamp_millis();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM citation_history
            WHERE scholar_id = ? AND timestamp_ms BETWEEN ? AND ?
            "#,
        )
        .bind(scholar_id)
        .bind(ts - window_ms)
        .bind(ts + window_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<HistoryEntry>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn get_history(
        &self,
        scholar_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE scholar_id = ? AND timestamp_ms >= ? AND timestamp_ms <= ? ORDER BY timestamp_ms ASC",
            SELECT_COLUMNS
        ))
        .bind(scholar_id)
        .bind(from.map(|d| d.timestamp_millis()).unwrap_or(i64::MIN))
        .bind(to.map(|d| d.timestamp_millis()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn get_latest(&self, scholar_id: &str) -> StoreResult<Option<HistoryEntry>> {
        let row = sqlx::query(&format!(
            "{} WHERE scholar_id = ? ORDER BY timestamp_ms DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(scholar_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn get_all_entries(&self) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY scholar_id ASC, timestamp_ms ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn count_by_scholar(&self, scholar_id: &str) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM citation_history WHERE scholar_id = ?")
                .bind(scholar_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn get_stats(&self) -> StoreResult<HistoryStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(DISTINCT scholar_id) AS scholars,
                   MIN(timestamp_ms) AS oldest,
                   MAX(timestamp_ms) AS newest
            FROM citation_history
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let scholars: i64 = row.try_get("scholars")?;
        let oldest: Option<i64> = row.try_get("oldest")?;
        let newest: Option<i64> = row.try_get("newest")?;

        Ok((
            total,
            scholars,
            oldest.map(millis_to_datetime).transpose()?,
            newest.map(millis_to_datetime).transpose()?,
        ))
    }

    // ========== 删除 ==========

    async fn delete_by_scholar(&self, scholar_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM citation_history WHERE scholar_id = ?")
            .bind(scholar_id)
            .execute(&self.pool)
            .await?;

        info!(
            "删除学者 {} 的 {} 条历史记录",
            scholar_id,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM citation_history WHERE timestamp_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted_count = result.rows_affected();
        if deleted_count > 0 {
            info!("删除了 {} 条过期历史记录", deleted_count);
        }

        Ok(deleted_count)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM citation_history WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_after(&self, scholar_id: &str, timestamp: DateTime<Utc>) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM citation_history WHERE scholar_id = ? AND timestamp_ms > ?")
                .bind(scholar_id)
                .bind(timestamp.timestamp_millis())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    // ========== 元数据 ==========

    async fn initialize_tables(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS citation_history (
                id TEXT PRIMARY KEY,
                scholar_id TEXT NOT NULL,
                citation_count INTEGER NOT NULL CHECK (citation_count >= 0),
                timestamp_ms INTEGER NOT NULL,
                source TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_citation_history_scholar_time ON citation_history(scholar_id, timestamp_ms)",
        )
        .execute(&self.pool)
        .await?;

        info!("历史数据表初始化完成");
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}
