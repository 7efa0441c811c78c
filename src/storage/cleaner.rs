// 历史清理模块 - 按保留天数自动清理过期记录

use super::HistoryStore;
use crate::error::StoreResult;
use crate::settings::SettingsManager;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

/// 历史清理器
pub struct HistoryCleaner {
    store: HistoryStore,
    settings: Arc<SettingsManager>,
}

impl HistoryCleaner {
    pub fn new(store: HistoryStore, settings: Arc<SettingsManager>) -> Self {
        Self { store, settings }
    }

    /// 启动自动清理任务
    pub fn start_cleanup_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(3600)); // 每小时检查一次
            info!("历史清理任务已启动，每小时检查一次");

            loop {
                interval.tick().await;

                if let Err(e) = self.perform_cleanup().await {
                    error!("清理任务执行失败: {}", e);
                }
            }
        })
    }

    /// 执行一次清理，未启用自动清理时直接返回 0
    pub async fn perform_cleanup(&self) -> StoreResult<u64> {
        let settings = self.settings.get().await;
        if !settings.auto_cleanup_enabled {
            debug!("自动清理未启用，跳过");
            return Ok(0);
        }

        self.cleanup_older_than_days(settings.retention_days).await
    }

    /// 手动触发清理（忽略自动清理开关）
    pub async fn trigger_cleanup(&self) -> StoreResult<u64> {
        info!("手动触发历史清理");
        let retention_days = self.settings.get().await.retention_days;
        self.cleanup_older_than_days(retention_days).await
    }

    async fn cleanup_older_than_days(&self, retention_days: i64) -> StoreResult<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days.max(1));
        info!("开始清理 {} 之前的历史记录", cutoff.format("%Y-%m-%d"));

        let deleted = self.store.delete_older_than(cutoff).await?;
        info!("清理完成，删除了 {} 条记录", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingsUpdate;
    use crate::storage::{HistoryEntry, ScholarRegistry, StorageConfig};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cleanup_respects_switch_and_retention() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let registry = Arc::new(ScholarRegistry::open(config.scholars_path()).await.unwrap());
        let store = HistoryStore::open_sqlite(&config, registry).await.unwrap();
        let settings = Arc::new(SettingsManager::new(config.settings_path()).await.unwrap());

        let now = Utc::now();
        store
            .append(HistoryEntry::automatic("a", 1, now - ChronoDuration::days(400)))
            .await
            .unwrap();
        store
            .append(HistoryEntry::automatic("a", 2, now - ChronoDuration::days(10)))
            .await
            .unwrap();

        let cleaner = HistoryCleaner::new(store.clone(), settings.clone());
        assert_eq!(cleaner.perform_cleanup().await.unwrap(), 0, "默认不自动清理");

        settings
            .update(SettingsUpdate {
                auto_cleanup_enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cleaner.perform_cleanup().await.unwrap(), 1);
        assert_eq!(store.count_for("a").await.unwrap(), 1);
    }
}
