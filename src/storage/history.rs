// 历史数据门面 - 读直接走 Repository，写统一经 Store Writer 串行化

use super::config::StorageConfig;
use super::models::*;
use super::registry::ScholarRegistry;
use super::repository::sqlite::SqliteHistoryRepository;
use super::repository::HistoryRepository;
use super::writer::{ReadingOutcome, StoreWriterActor, StoreWriterHandle};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct Backend {
    repo: Arc<dyn HistoryRepository>,
    writer: StoreWriterHandle,
}

/// 引用历史存储
///
/// 同一学者任意两条记录的时间间隔都大于 60 秒；写入者只有一个，
/// 并发的刷新和导入也不会破坏这个约束。存储不可用时所有操作返回
/// `StoreError::Unavailable`。
#[derive(Clone)]
pub struct HistoryStore {
    backend: Option<Backend>,
}

impl HistoryStore {
    /// 基于给定 Repository 创建，并在当前 tokio 运行时中启动写入 Actor
    pub fn new(repo: Arc<dyn HistoryRepository>, registry: Arc<ScholarRegistry>) -> Self {
        let (actor, writer) = StoreWriterActor::new(repo.clone(), registry);
        tokio::spawn(actor.run());

        Self {
            backend: Some(Backend { repo, writer }),
        }
    }

    /// 打开数据目录下的 SQLite 历史库
    pub async fn open_sqlite(
        config: &StorageConfig,
        registry: Arc<ScholarRegistry>,
    ) -> StoreResult<Self> {
        let path = config.history_db_path();
        let repo = SqliteHistoryRepository::new(&path.to_string_lossy()).await?;
        info!("历史存储已就绪: {:?}", path);
        Ok(Self::new(Arc::new(repo), registry))
    }

    /// 不可用的存储，所有操作都返回 Unavailable
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> StoreResult<&Backend> {
        self.backend.as_ref().ok_or(StoreError::Unavailable)
    }

    // ========== 写入 ==========

    /// 追加一条记录；60 秒窗口内已有记录时不写入，返回 false
    pub async fn append(&self, entry: HistoryEntry) -> StoreResult<bool> {
        self.backend()?.writer.append(entry).await
    }

    /// 手动添加一条读数
    pub async fn add_manual(
        &self,
        scholar_id: &str,
        citation_count: i64,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let entry = HistoryEntry::new(scholar_id, citation_count, timestamp, DataSource::Manual);
        self.append(entry).await
    }

    /// 写入抓取读数并更新学者快照，返回写入前的最新记录
    pub async fn record_reading(
        &self,
        scholar_id: &str,
        name: Option<&str>,
        citation_count: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<ReadingOutcome> {
        self.backend()?
            .writer
            .record_reading(
                scholar_id.to_string(),
                name.map(str::to_string),
                citation_count,
                at,
            )
            .await
    }

    /// 修复编辑：原地替换引用数
    pub async fn update_count(&self, entry_id: &str, citation_count: i64) -> StoreResult<HistoryEntry> {
        self.backend()?
            .writer
            .update_count(entry_id.to_string(), citation_count)
            .await
    }

    // ========== 查询 ==========

    /// 闭区间范围查询，按时间升序
    pub async fn query(
        &self,
        scholar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        self.backend()?
            .repo
            .get_history(scholar_id, Some(from), Some(to))
            .await
    }

    /// 按预设时间窗查询
    pub async fn query_range(&self, scholar_id: &str, range: TimeRange) -> StoreResult<Vec<HistoryEntry>> {
        let (from, to) = range.resolve(Utc::now());
        self.query(scholar_id, from, to).await
    }

    /// 学者的全部历史
    pub async fn history_of(&self, scholar_id: &str) -> StoreResult<Vec<HistoryEntry>> {
        self.backend()?.repo.get_history(scholar_id, None, None).await
    }

    pub async fn latest(&self, scholar_id: &str) -> StoreResult<Option<HistoryEntry>> {
        self.backend()?.repo.get_latest(scholar_id).await
    }

    pub async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<HistoryEntry>> {
        self.backend()?.repo.get_entry(entry_id).await
    }

    pub async fn all_entries(&self) -> StoreResult<Vec<HistoryEntry>> {
        self.backend()?.repo.get_all_entries().await
    }

    pub async fn count_for(&self, scholar_id: &str) -> StoreResult<i64> {
        self.backend()?.repo.count_by_scholar(scholar_id).await
    }

    /// 整体数据统计
    pub async fn statistics(&self, total_scholars: usize) -> StoreResult<DataStatistics> {
        let (total, scholars, oldest, newest) = self.backend()?.repo.get_stats().await?;
        Ok(DataStatistics {
            total_scholars,
            total_history_records: total,
            scholars_with_history: scholars,
            oldest_record: oldest,
            newest_record: newest,
        })
    }

    /// 单个学者在时间窗内的统计
    pub async fn scholar_statistics(
        &self,
        scholar_id: &str,
        range: TimeRange,
    ) -> StoreResult<CitationStatistics> {
        let entries = self.query_range(scholar_id, range).await?;
        Ok(CitationStatistics::from_entries(&entries))
    }

    // ========== 删除 ==========

    pub async fn delete_all(&self, scholar_id: &str) -> StoreResult<u64> {
        self.backend()?.writer.delete_all(scholar_id.to_string()).await
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.backend()?.writer.delete_older_than(cutoff).await
    }

    pub async fn delete_many(&self, entries: &[HistoryEntry]) -> StoreResult<u64> {
        let ids = entries.iter().map(|e| e.id.clone()).collect();
        self.delete_ids(ids).await
    }

    pub async fn delete_ids(&self, ids: Vec<String>) -> StoreResult<u64> {
        self.backend()?.writer.delete_many(ids).await
    }

    /// 删除该学者在 point 之后的全部记录（point 本身保留），并把快照设为 point 的值
    pub async fn restore_to_point(&self, scholar_id: &str, point: &HistoryEntry) -> StoreResult<u64> {
        self.backend()?
            .writer
            .restore_to_point(scholar_id.to_string(), point.clone())
            .await
    }

    /// 级联删除学者：先删历史，再从学者列表移除
    pub async fn remove_scholar(&self, scholar_id: &str) -> StoreResult<Option<ScholarRecord>> {
        self.backend()?
            .writer
            .remove_scholar(scholar_id.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::{tempdir, TempDir};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn open_store() -> (TempDir, HistoryStore, Arc<ScholarRegistry>) {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let registry = Arc::new(ScholarRegistry::open(config.scholars_path()).await.unwrap());
        let store = HistoryStore::open_sqlite(&config, registry.clone())
            .await
            .unwrap();
        (dir, store, registry)
    }

    #[tokio::test]
    async fn test_append_is_idempotent_within_window() {
        let (_dir, store, _) = open_store().await;

        assert!(store.append(HistoryEntry::automatic("abc", 10, at(0))).await.unwrap());
        assert!(!store.append(HistoryEntry::automatic("abc", 10, at(0))).await.unwrap());
        assert!(!store.append(HistoryEntry::automatic("abc", 11, at(60))).await.unwrap());
        assert!(store.append(HistoryEntry::automatic("abc", 12, at(61))).await.unwrap());
        // 不同学者互不影响
        assert!(store.append(HistoryEntry::automatic("xyz", 1, at(0))).await.unwrap());

        assert_eq!(store.count_for("abc").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_append_rejects_negative_count() {
        let (_dir, store, _) = open_store().await;
        let err = store
            .append(HistoryEntry::automatic("abc", -1, at(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEntry(_)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_one_row() {
        let (_dir, store, _) = open_store().await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .append(HistoryEntry::automatic("abc", 100 + i, at(i)))
                    .await
            });
        }
        let mut written = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap() {
                written += 1;
            }
        }

        assert_eq!(written, 1, "并发写入在去重窗口内只能落一条");
        assert_eq!(store.count_for("abc").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_range_is_sorted_and_bounded() {
        let (_dir, store, _) = open_store().await;
        let now = Utc::now();
        for days in [40, 3, 10, 1] {
            store
                .append(HistoryEntry::automatic("abc", 100 - days, now - Duration::days(days)))
                .await
                .unwrap();
        }

        let week = store.query_range("abc", TimeRange::LastWeek).await.unwrap();
        assert_eq!(week.len(), 2);
        assert!(week.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(week.iter().all(|e| e.timestamp >= now - Duration::weeks(1)));

        let month = store.query_range("abc", TimeRange::LastMonth).await.unwrap();
        assert_eq!(month.len(), 3);
    }

    #[tokio::test]
    async fn test_restore_to_point_keeps_point() {
        let (_dir, store, registry) = open_store().await;
        registry.add(ScholarRecord::new("abc", "Jane")).await.unwrap();

        let mut entries = Vec::new();
        for (i, count) in [100, 110, 120, 130].iter().enumerate() {
            let entry = HistoryEntry::automatic("abc", *count, at(i as i64 * 3600));
            store.append(entry.clone()).await.unwrap();
            entries.push(entry);
        }

        let point = &entries[1];
        let deleted = store.restore_to_point("abc", point).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.history_of("abc").await.unwrap();
        assert!(remaining.iter().all(|e| e.timestamp <= point.timestamp));
        assert_eq!(remaining.last().unwrap().id, point.id);

        let scholar = registry.get("abc").await.unwrap();
        assert_eq!(scholar.citation_count, Some(110));
        assert_eq!(scholar.last_updated, Some(point.timestamp));
    }

    #[tokio::test]
    async fn test_update_count_bumps_snapshot_for_latest() {
        let (_dir, store, registry) = open_store().await;
        registry.add(ScholarRecord::new("abc", "Jane")).await.unwrap();

        let old = HistoryEntry::automatic("abc", 50, at(0));
        let latest = HistoryEntry::automatic("abc", 60, at(3600));
        store.append(old.clone()).await.unwrap();
        store.append(latest.clone()).await.unwrap();

        store.update_count(&old.id, 55).await.unwrap();
        assert_eq!(registry.get("abc").await.unwrap().citation_count, None);

        store.update_count(&latest.id, 65).await.unwrap();
        assert_eq!(registry.get("abc").await.unwrap().citation_count, Some(65));

        let err = store.update_count("missing", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_scholar_cascades() {
        let (_dir, store, registry) = open_store().await;
        registry.add(ScholarRecord::new("abc", "Jane")).await.unwrap();
        store.append(HistoryEntry::automatic("abc", 1, at(0))).await.unwrap();
        store.append(HistoryEntry::automatic("abc", 2, at(600))).await.unwrap();

        let removed = store.remove_scholar("abc").await.unwrap();
        assert_eq!(removed.map(|s| s.id), Some("abc".to_string()));
        assert_eq!(store.count_for("abc").await.unwrap(), 0);
        assert!(registry.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_operations() {
        let (_dir, store, _) = open_store().await;
        let entries: Vec<HistoryEntry> = (0..4)
            .map(|i| HistoryEntry::automatic("a", i, at(i * 3600)))
            .collect();
        for entry in &entries {
            store.append(entry.clone()).await.unwrap();
        }
        store.append(HistoryEntry::automatic("b", 1, at(0))).await.unwrap();

        assert_eq!(store.delete_many(&entries[2..]).await.unwrap(), 2);
        assert_eq!(store.delete_older_than(at(1)).await.unwrap(), 2, "a 和 b 在 at(0) 的记录");
        assert_eq!(store.count_for("a").await.unwrap(), 1);

        assert_eq!(store.delete_all("a").await.unwrap(), 1);
        assert!(store.all_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics() {
        let (_dir, store, _) = open_store().await;
        store.append(HistoryEntry::automatic("a", 1, at(0))).await.unwrap();
        store.append(HistoryEntry::automatic("b", 2, at(100))).await.unwrap();
        store.add_manual("b", 3, at(500)).await.unwrap();

        let stats = store.statistics(3).await.unwrap();
        assert_eq!(stats.total_scholars, 3);
        assert_eq!(stats.total_history_records, 3);
        assert_eq!(stats.scholars_with_history, 2);
        assert_eq!(stats.oldest_record, Some(at(0)));
        assert_eq!(stats.newest_record, Some(at(500)));

        let latest = store.latest("b").await.unwrap().unwrap();
        assert_eq!(latest.source, DataSource::Manual);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = HistoryStore::unavailable();
        assert!(!store.is_available());
        assert_eq!(
            store.append(HistoryEntry::automatic("a", 1, at(0))).await,
            Err(StoreError::Unavailable)
        );
        assert_eq!(store.latest("a").await, Err(StoreError::Unavailable));
        assert_eq!(store.delete_all("a").await, Err(StoreError::Unavailable));
    }
}
