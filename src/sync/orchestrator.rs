// 同步编排器 - 抓取 -> 写入历史 -> 变化检测
//
// 批量刷新并发扇出、统一汇总；单个学者失败不影响其他学者

use super::cancel::CancelToken;
use crate::error::{StoreError, SyncError};
use crate::event_bus::{AppEvent, EventBus};
use crate::models::{ChangeEvent, RefreshSummary};
use crate::notify::{ChangeDetector, ChangeNotifier};
use crate::scholar::{ScholarFetcher, UNKNOWN_SCHOLAR};
use crate::settings::SettingsManager;
use crate::storage::{HistoryStore, ScholarRegistry};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SyncOrchestrator {
    fetcher: Arc<dyn ScholarFetcher>,
    store: HistoryStore,
    registry: Arc<ScholarRegistry>,
    bus: Arc<EventBus>,
    notifier: Arc<ChangeNotifier>,
    settings: Arc<SettingsManager>,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: Arc<dyn ScholarFetcher>,
        store: HistoryStore,
        registry: Arc<ScholarRegistry>,
        bus: Arc<EventBus>,
        notifier: Arc<ChangeNotifier>,
        settings: Arc<SettingsManager>,
    ) -> Self {
        Self {
            fetcher,
            store,
            registry,
            bus,
            notifier,
            settings,
        }
    }

    /// 刷新单个学者，不发通知
    ///
    /// 抓取完成时令牌已取消则直接丢弃结果，不写存储也不发事件。
    /// 读数落在 60 秒去重窗口内时快照照常更新，但不做变化检测。
    pub async fn refresh_scholar(
        &self,
        scholar_id: &str,
        token: &CancelToken,
    ) -> Result<Option<ChangeEvent>, SyncError> {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let scholar = self
            .registry
            .get(scholar_id)
            .await
            .ok_or_else(|| SyncError::UnknownScholar(scholar_id.to_string()))?;

        let info = match self.fetcher.fetch(scholar_id).await {
            Ok(info) => info,
            Err(e) => {
                if token.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                warn!("学者 {} 抓取失败: {}", scholar_id, e);
                self.bus.publish(AppEvent::ScholarRefreshFailed {
                    scholar_id: scholar_id.to_string(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if token.is_cancelled() {
            debug!("刷新已取消，丢弃学者 {} 的抓取结果", scholar_id);
            return Err(SyncError::Cancelled);
        }

        // 页面上没解析出名字时保留原来的显示名
        let fetched_name = Some(info.name.as_str()).filter(|n| *n != UNKNOWN_SCHOLAR);
        let now = Utc::now();
        let outcome = match self
            .store
            .record_reading(scholar_id, fetched_name, info.citation_count, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound(_)) => {
                debug!("学者 {} 已在抓取期间被移除，丢弃读数", scholar_id);
                return Err(SyncError::UnknownScholar(scholar_id.to_string()));
            }
            Err(e) => {
                error!("学者 {} 的读数写入失败: {}", scholar_id, e);
                self.bus.publish(AppEvent::ScholarRefreshFailed {
                    scholar_id: scholar_id.to_string(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let name = fetched_name.unwrap_or(&scholar.display_name).to_string();
        self.bus.publish(AppEvent::ScholarRefreshed {
            scholar_id: scholar_id.to_string(),
            name: name.clone(),
            citation_count: info.citation_count,
            timestamp: now,
        });

        if !outcome.written {
            debug!("学者 {} 的读数落在去重窗口内，未写入历史", scholar_id);
            return Ok(None);
        }

        let threshold = self.settings.get().await.notification.threshold;
        let event = ChangeDetector::new(threshold).detect(
            outcome.previous.as_ref(),
            scholar_id,
            &name,
            info.citation_count,
            now,
        );

        if let Some(event) = &event {
            info!(
                "学者 {} 引用数变化: {} -> {} ({:+})",
                name, event.previous_count, event.new_count, event.delta
            );
            self.bus.publish(AppEvent::CitationChanged(event.clone()));
        }
        Ok(event)
    }

    /// 按需刷新单个学者，显著变化走单条通知
    pub async fn refresh_one(
        &self,
        scholar_id: &str,
        token: &CancelToken,
    ) -> Result<Option<ChangeEvent>, SyncError> {
        let event = self.refresh_scholar(scholar_id, token).await?;
        if let Some(event) = &event {
            self.notifier.notify(event).await;
        }
        Ok(event)
    }

    /// 并发刷新全部学者并汇总
    ///
    /// 批次结束时令牌已取消则只返回汇总，不发完成事件、不通知、不更新同步时间
    pub async fn refresh_all(&self, token: &CancelToken) -> RefreshSummary {
        let scholars = self.registry.list().await;
        let order: HashMap<String, usize> = scholars
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut summary = RefreshSummary {
            total: scholars.len(),
            ..Default::default()
        };
        info!("开始批量刷新 {} 位学者", summary.total);

        let mut tasks = JoinSet::new();
        for scholar in scholars {
            let this = self.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let result = this.refresh_scholar(&scholar.id, &token).await;
                (scholar.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(event))) => {
                    summary.success_count += 1;
                    summary.change_events.extend(event);
                }
                Ok((_, Err(SyncError::Cancelled))) => {}
                Ok((scholar_id, Err(e))) => {
                    let message = e.to_string();
                    summary.failure_count += 1;
                    summary.failures.push((scholar_id, message.clone()));
                    summary.last_error = Some(message);
                }
                Err(e) => {
                    error!("刷新任务异常退出: {}", e);
                    summary.failure_count += 1;
                    summary.last_error = Some(e.to_string());
                }
            }
        }

        // 汇总结果按学者列表顺序排列
        let position = |id: &str| order.get(id).copied().unwrap_or(usize::MAX);
        summary
            .change_events
            .sort_by_key(|e| position(&e.scholar_id));
        summary.failures.sort_by_key(|(id, _)| position(id));

        if token.is_cancelled() {
            info!("批量刷新已取消，丢弃汇总");
            return summary;
        }

        info!(
            "批量刷新完成: 成功 {}, 失败 {}, 变化 {}",
            summary.success_count,
            summary.failure_count,
            summary.change_events.len()
        );
        self.bus.publish(AppEvent::RefreshCompleted(summary.clone()));
        self.notifier.notify_batch(&summary.change_events).await;

        if let Err(e) = self.settings.set_last_sync_time(Utc::now()).await {
            warn!("同步时间写入失败: {}", e);
        }
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::scholar::ScholarInfo;
    use crate::storage::{HistoryEntry, ScholarRecord, StorageConfig};
    use crate::sync::CancelHandle;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::Notify;

    /// 按学者ID返回预设结果的抓取器
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        results: Mutex<HashMap<String, Result<ScholarInfo, FetchError>>>,
        pub(crate) calls: AtomicUsize,
        cancel_on_fetch: Mutex<Option<Arc<CancelHandle>>>,
    }

    impl FakeFetcher {
        pub(crate) fn set(&self, id: &str, result: Result<ScholarInfo, FetchError>) {
            self.results.lock().unwrap().insert(id.to_string(), result);
        }

        pub(crate) fn ok(&self, id: &str, name: &str, count: i64) {
            self.set(
                id,
                Ok(ScholarInfo {
                    name: name.to_string(),
                    citation_count: count,
                }),
            );
        }
    }

    #[async_trait]
    impl ScholarFetcher for FakeFetcher {
        async fn fetch(&self, scholar_id: &str) -> Result<ScholarInfo, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.cancel_on_fetch.lock().unwrap().as_ref() {
                handle.cancel();
            }
            self.results
                .lock()
                .unwrap()
                .get(scholar_id)
                .cloned()
                .unwrap_or(Err(FetchError::NoData))
        }
    }

    pub(crate) struct Fixture {
        pub(crate) _dir: TempDir,
        pub(crate) orchestrator: SyncOrchestrator,
        pub(crate) fetcher: Arc<FakeFetcher>,
        pub(crate) store: HistoryStore,
        pub(crate) registry: Arc<ScholarRegistry>,
        pub(crate) bus: Arc<EventBus>,
        pub(crate) settings: Arc<SettingsManager>,
    }

    pub(crate) async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let registry = Arc::new(ScholarRegistry::open(config.scholars_path()).await.unwrap());
        let store = HistoryStore::open_sqlite(&config, registry.clone()).await.unwrap();
        let settings = Arc::new(SettingsManager::new(config.settings_path()).await.unwrap());
        let bus = Arc::new(EventBus::new(100));
        let notifier = Arc::new(ChangeNotifier::new(bus.clone(), settings.clone()));
        let fetcher = Arc::new(FakeFetcher::default());

        let orchestrator = SyncOrchestrator::new(
            fetcher.clone(),
            store.clone(),
            registry.clone(),
            bus.clone(),
            notifier,
            settings.clone(),
        );
        Fixture {
            _dir: dir,
            orchestrator,
            fetcher,
            store,
            registry,
            bus,
            settings,
        }
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let f = fixture().await;
        for id in ["a", "b", "c"] {
            f.registry.add(ScholarRecord::new(id, "")).await.unwrap();
        }
        f.fetcher.ok("a", "Alice", 10);
        f.fetcher.set("b", Err(FetchError::Parse));
        f.fetcher.ok("c", "Carol", 30);

        let mut events = f.bus.subscribe();
        let summary = f.orchestrator.refresh_all(&CancelToken::none()).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.failures[0].0, "b");
        assert!(summary.last_error.is_some());
        assert!(summary.change_events.is_empty(), "首次读数不产生变化事件");

        assert_eq!(f.registry.get("a").await.unwrap().display_name, "Alice");
        assert_eq!(f.registry.get("c").await.unwrap().citation_count, Some(30));
        assert!(f.settings.get().await.last_sync_time.is_some());

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, AppEvent::RefreshCompleted(_)) {
                completed = true;
            }
        }
        assert!(completed);
    }

    #[tokio::test]
    async fn test_change_detected_against_previous_entry() {
        let f = fixture().await;
        f.registry.add(ScholarRecord::new("a", "Alice")).await.unwrap();
        let yesterday = Utc::now() - Duration::days(1);
        f.store
            .append(HistoryEntry::automatic("a", 100, yesterday))
            .await
            .unwrap();
        f.fetcher.ok("a", "Alice", 108);

        let event = f
            .orchestrator
            .refresh_scholar("a", &CancelToken::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.previous_count, 100);
        assert_eq!(event.delta, 8);
        assert!(event.significant);
        assert_eq!(f.store.count_for("a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_name_keeps_display_name() {
        let f = fixture().await;
        f.registry.add(ScholarRecord::new("a", "Alice")).await.unwrap();
        f.fetcher.ok("a", UNKNOWN_SCHOLAR, 5);

        f.orchestrator
            .refresh_scholar("a", &CancelToken::none())
            .await
            .unwrap();
        let scholar = f.registry.get("a").await.unwrap();
        assert_eq!(scholar.display_name, "Alice");
        assert_eq!(scholar.citation_count, Some(5));
    }

    #[tokio::test]
    async fn test_results_after_cancellation_are_dropped() {
        let f = fixture().await;
        f.registry.add(ScholarRecord::new("a", "Alice")).await.unwrap();
        f.fetcher.ok("a", "Alice", 5);

        let handle = Arc::new(CancelHandle::new());
        *f.fetcher.cancel_on_fetch.lock().unwrap() = Some(handle.clone());

        let result = f.orchestrator.refresh_scholar("a", &handle.token()).await;
        assert_eq!(result, Err(SyncError::Cancelled));
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.count_for("a").await.unwrap(), 0);
        assert_eq!(f.registry.get("a").await.unwrap().citation_count, None);
    }

    /// 进入 fetch 后阻塞，直到测试放行
    struct GatedFetcher {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ScholarFetcher for GatedFetcher {
        async fn fetch(&self, _scholar_id: &str) -> Result<ScholarInfo, FetchError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ScholarInfo {
                name: "Alice".to_string(),
                citation_count: 42,
            })
        }
    }

    #[tokio::test]
    async fn test_scholar_removed_during_fetch_leaves_no_history() {
        let f = fixture().await;
        f.registry.add(ScholarRecord::new("a", "Alice")).await.unwrap();

        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let notifier = Arc::new(ChangeNotifier::new(f.bus.clone(), f.settings.clone()));
        let orchestrator = SyncOrchestrator::new(
            fetcher.clone(),
            f.store.clone(),
            f.registry.clone(),
            f.bus.clone(),
            notifier,
            f.settings.clone(),
        );

        let task = tokio::spawn(async move {
            orchestrator
                .refresh_scholar("a", &CancelToken::none())
                .await
        });
        fetcher.entered.notified().await;
        f.store.remove_scholar("a").await.unwrap();
        fetcher.release.notify_one();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SyncError::UnknownScholar(_))));
        assert_eq!(f.store.count_for("a").await.unwrap(), 0);
        assert!(f.registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_scholar() {
        let f = fixture().await;
        let result = f
            .orchestrator
            .refresh_scholar("nobody", &CancelToken::none())
            .await;
        assert!(matches!(result, Err(SyncError::UnknownScholar(_))));
        assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
