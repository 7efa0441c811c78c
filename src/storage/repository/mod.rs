// Repository 抽象层 - 定义历史数据的持久化接口
//
// 这里只负责读写，不包含去重等业务规则；规则由 HistoryStore 统一施加

pub mod sqlite;

use super::models::*;
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 历史库整体统计（总条数, 有历史的学者数, 最早时间, 最新时间）
pub type HistoryStats = (i64, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>);

/// 历史数据操作接口 - 所有持久化实现必须实现此 trait
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    // ========== 写入 ==========

    /// 插入一条历史记录
    async fn insert_entry(&self, entry: &HistoryEntry) -> StoreResult<()>;

    /// 更新记录的引用数（修复编辑），返回受影响行数
    async fn update_citation_count(&self, entry_id: &str, citation_count: i64) -> StoreResult<u64>;

    // ========== 查询 ==========

    /// 指定时间附近（闭区间 ±window_ms）是否已有该学者的记录
    async fn has_entry_near(
        &self,
        scholar_id: &str,
        timestamp: DateTime<Utc>,
        window_ms: i64,
    ) -> StoreResult<bool>;

    /// 按ID获取记录
    async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<HistoryEntry>>;

    /// 按时间升序获取学者历史，边界为闭区间，None 表示不限
    async fn get_history(
        &self,
        scholar_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<HistoryEntry>>;

    /// 获取学者最新一条记录
    async fn get_latest(&self, scholar_id: &str) -> StoreResult<Option<HistoryEntry>>;

    /// 获取全部记录（按学者、时间排序）
    async fn get_all_entries(&self) -> StoreResult<Vec<HistoryEntry>>;

    /// 学者历史记录条数
    async fn count_by_scholar(&self, scholar_id: &str) -> StoreResult<i64>;

    /// 整体统计
    async fn get_stats(&self) -> StoreResult<HistoryStats>;

    // ========== 删除 ==========

    /// 删除学者的全部记录
    async fn delete_by_scholar(&self, scholar_id: &str) -> StoreResult<u64>;

    /// 删除早于指定时间的记录
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// 按ID批量删除
    async fn delete_by_ids(&self, ids: &[String]) -> StoreResult<u64>;

    /// 删除学者在指定时间之后（不含）的记录
    async fn delete_after(&self, scholar_id: &str, timestamp: DateTime<Utc>) -> StoreResult<u64>;

    // ========== 元数据 ==========

    /// 初始化表结构
    async fn initialize_tables(&self) -> StoreResult<()>;

    /// 数据库类型标识
    fn db_type(&self) -> &str;
}
