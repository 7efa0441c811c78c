//! 引擎门面和应用启动
//!
//! `CiteTrack` 把学者列表、历史存储、同步、通知和导入导出组装在一起，
//! 对外提供协作方需要的全部操作；`run()` 以无界面方式启动引擎：
//! - 日志系统初始化
//! - 打开数据目录（历史库打开失败时以不可用模式继续运行）
//! - 启动定时同步和历史清理
//! - 等待 Ctrl-C 退出

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AppError, StoreError};
use crate::event_bus::{AppEvent, EventBus};
use crate::exchange::{ExportShape, Reconciler};
use crate::logger;
use crate::models::*;
use crate::notify::ChangeNotifier;
use crate::scholar::{
    extract_scholar_id, GoogleScholarClient, RateLimiter, RetryPolicy, ScholarFetcher,
    ScholarFetcherExt, SystemClock,
};
use crate::settings::SettingsManager;
use crate::storage::{default_data_dir, HistoryCleaner, HistoryStore, ScholarRegistry, StorageConfig};
use crate::sync::{CancelHandle, SyncOrchestrator, SyncScheduler};

/// 事件总线缓冲区大小
const EVENT_BUS_CAPACITY: usize = 256;

/// 引擎句柄，克隆后共享同一套组件
#[derive(Clone)]
pub struct CiteTrack {
    config: StorageConfig,
    registry: Arc<ScholarRegistry>,
    store: HistoryStore,
    settings: Arc<SettingsManager>,
    bus: Arc<EventBus>,
    notifier: Arc<ChangeNotifier>,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Arc<SyncScheduler>,
    cleaner: Arc<HistoryCleaner>,
    reconciler: Reconciler,
    /// 引擎关闭后，按需刷新的迟到结果一律丢弃
    lifetime: Arc<CancelHandle>,
    cleanup_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CiteTrack {
    /// 用默认的 Google Scholar 客户端打开引擎
    ///
    /// 限流间隔和重试策略取自启动时的设置
    pub async fn open(config: StorageConfig) -> anyhow::Result<Self> {
        let settings = SettingsManager::new(config.settings_path()).await?;
        let snapshot = settings.get().await;

        let clock = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(snapshot.min_request_interval_ms),
            clock.clone(),
            clock.clone(),
        ));
        let fetcher = GoogleScholarClient::new()?
            .with_rate_limit(limiter)
            .with_retry(RetryPolicy::from(&snapshot.retry), clock);

        Self::assemble(config, Arc::new(settings), Arc::new(fetcher)).await
    }

    /// 使用指定的抓取器打开引擎
    pub async fn open_with_fetcher(
        config: StorageConfig,
        fetcher: Arc<dyn ScholarFetcher>,
    ) -> anyhow::Result<Self> {
        let settings = SettingsManager::new(config.settings_path()).await?;
        Self::assemble(config, Arc::new(settings), fetcher).await
    }

    async fn assemble(
        config: StorageConfig,
        settings: Arc<SettingsManager>,
        fetcher: Arc<dyn ScholarFetcher>,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        info!("数据目录: {:?}", config.data_dir);

        let registry = Arc::new(ScholarRegistry::open(config.scholars_path()).await?);
        let store = match HistoryStore::open_sqlite(&config, registry.clone()).await {
            Ok(store) => store,
            Err(e) => {
                error!("历史存储打开失败，以不可用模式运行: {}", e);
                HistoryStore::unavailable()
            }
        };

        let bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let notifier = Arc::new(ChangeNotifier::new(bus.clone(), settings.clone()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            fetcher,
            store.clone(),
            registry.clone(),
            bus.clone(),
            notifier.clone(),
            settings.clone(),
        ));
        let scheduler = Arc::new(SyncScheduler::new(orchestrator.clone()));
        let cleaner = Arc::new(HistoryCleaner::new(store.clone(), settings.clone()));
        let reconciler = Reconciler::new(store.clone(), registry.clone());

        info!("引擎初始化完成，跟踪 {} 位学者", registry.len().await);
        Ok(Self {
            config,
            registry,
            store,
            settings,
            bus,
            notifier,
            orchestrator,
            scheduler,
            cleaner,
            reconciler,
            lifetime: Arc::new(CancelHandle::new()),
            cleanup_task: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn is_store_available(&self) -> bool {
        self.store.is_available()
    }

    /// 订阅引擎事件
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.bus.subscribe()
    }

    // ========== 学者列表 ==========

    pub async fn scholars(&self) -> Vec<ScholarRecord> {
        self.registry.list().await
    }

    /// 添加学者，输入可以是ID或主页链接
    pub async fn add_scholar(&self, input: &str) -> Result<ScholarRecord, AppError> {
        let id = extract_scholar_id(input)?;
        let scholar = self.registry.add(ScholarRecord::new(id, "")).await?;
        self.bus.publish(AppEvent::ScholarsChanged);
        Ok(scholar)
    }

    /// 移除学者及其全部历史
    pub async fn remove_scholar(&self, scholar_id: &str) -> Result<Option<ScholarRecord>, AppError> {
        let removed = match self.store.remove_scholar(scholar_id).await {
            Err(StoreError::Unavailable) => {
                warn!("存储不可用，仅从学者列表移除 {}", scholar_id);
                self.registry.remove(scholar_id).await?
            }
            other => other?,
        };

        if removed.is_some() {
            self.bus.publish(AppEvent::ScholarsChanged);
        }
        Ok(removed)
    }

    pub async fn reorder_scholars(&self, from: usize, to: usize) -> Result<(), AppError> {
        self.registry.reorder(from, to).await?;
        self.bus.publish(AppEvent::ScholarsChanged);
        Ok(())
    }

    // ========== 历史 ==========

    /// 时间窗内的历史；存储出错时降级为空列表
    pub async fn history(&self, scholar_id: &str, range: TimeRange) -> Vec<HistoryEntry> {
        match self.store.query_range(scholar_id, range).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("查询学者 {} 的历史失败: {}", scholar_id, e);
                Vec::new()
            }
        }
    }

    /// 时间窗内的统计；存储出错时按空历史计算
    pub async fn scholar_statistics(&self, scholar_id: &str, range: TimeRange) -> CitationStatistics {
        match self.store.scholar_statistics(scholar_id, range).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("统计学者 {} 的历史失败: {}", scholar_id, e);
                CitationStatistics::from_entries(&[])
            }
        }
    }

    pub async fn statistics(&self) -> DataStatistics {
        let total_scholars = self.registry.len().await;
        match self.store.statistics(total_scholars).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("数据统计失败: {}", e);
                DataStatistics {
                    total_scholars,
                    ..Default::default()
                }
            }
        }
    }

    /// 手动补录一条读数
    pub async fn add_manual_entry(
        &self,
        scholar_id: &str,
        citation_count: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(self.store.add_manual(scholar_id, citation_count, timestamp).await?)
    }

    // ========== 同步 ==========

    pub async fn refresh_scholar(&self, scholar_id: &str) -> Result<Option<ChangeEvent>, AppError> {
        let token = self.lifetime.token();
        Ok(self.orchestrator.refresh_one(scholar_id, &token).await?)
    }

    pub async fn refresh_all(&self) -> RefreshSummary {
        let token = self.lifetime.token();
        self.orchestrator.refresh_all(&token).await
    }

    /// 按设置中的间隔启动定时同步
    pub async fn start_sync(&self) {
        let period = self.settings.get().await.update_interval.as_duration();
        self.scheduler.start(period).await;
    }

    pub async fn stop_sync(&self) {
        self.scheduler.stop().await;
    }

    pub async fn is_sync_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    /// 最近的显著变化
    pub fn recent_changes(&self) -> Vec<ChangeEvent> {
        self.notifier.recent()
    }

    pub fn clear_recent_changes(&self) {
        self.notifier.clear_recent();
    }

    // ========== 设置 ==========

    pub async fn settings(&self) -> AppSettings {
        self.settings.get().await
    }

    /// 更新设置；定时器运行中且间隔变化时按新间隔重启
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<AppSettings, AppError> {
        let previous = self.settings.get().await.update_interval;
        let updated = self
            .settings
            .update(update)
            .await
            .map_err(|e| AppError::Settings(e.to_string()))?;
        self.bus.publish(AppEvent::SettingsUpdated);

        if updated.update_interval != previous && self.scheduler.is_running().await {
            info!(
                "同步间隔变化: {}秒 -> {}秒",
                previous.as_secs(),
                updated.update_interval.as_secs()
            );
            self.scheduler
                .restart(updated.update_interval.as_duration())
                .await;
        }
        Ok(updated)
    }

    // ========== 导入导出 ==========

    pub async fn export_json(&self, shape: ExportShape) -> Result<Vec<u8>, AppError> {
        let settings = self.settings.get().await;
        Ok(self.reconciler.export(shape, Some(&settings)).await?)
    }

    pub async fn export_to_file(&self, path: &Path, shape: ExportShape) -> Result<(), AppError> {
        let settings = self.settings.get().await;
        Ok(self
            .reconciler
            .export_to_file(path, shape, Some(&settings))
            .await?)
    }

    /// 导入 JSON；负载中带有设置时一并应用
    pub async fn import_json(&self, bytes: &[u8]) -> Result<ImportSummary, AppError> {
        let outcome = self.reconciler.import(bytes).await?;
        self.after_import(outcome).await
    }

    pub async fn import_from_file(&self, path: &Path) -> Result<ImportSummary, AppError> {
        let outcome = self.reconciler.import_from_file(path).await?;
        self.after_import(outcome).await
    }

    async fn after_import(
        &self,
        outcome: crate::exchange::ImportOutcome,
    ) -> Result<ImportSummary, AppError> {
        if let Some(update) = outcome.settings {
            self.update_settings(update).await?;
        }
        if outcome.summary.imported_scholars > 0 {
            self.bus.publish(AppEvent::ScholarsChanged);
        }
        self.bus
            .publish(AppEvent::HistoryImported(outcome.summary.clone()));
        Ok(outcome.summary)
    }

    // ========== 数据修复 ==========

    /// 回滚到某条记录：删除其后的所有记录，快照恢复为该记录的值
    pub async fn restore_to_point(&self, scholar_id: &str, entry_id: &str) -> Result<u64, AppError> {
        let point = self
            .store
            .get_entry(entry_id)
            .await?
            .filter(|e| e.scholar_id == scholar_id)
            .ok_or_else(|| StoreError::NotFound(entry_id.to_string()))?;

        let deleted = self.store.restore_to_point(scholar_id, &point).await?;
        self.bus.publish(AppEvent::ScholarsChanged);
        Ok(deleted)
    }

    pub async fn repair_count(&self, entry_id: &str, citation_count: i64) -> Result<HistoryEntry, AppError> {
        Ok(self.store.update_count(entry_id, citation_count).await?)
    }

    pub async fn delete_entries(&self, ids: Vec<String>) -> Result<u64, AppError> {
        Ok(self.store.delete_ids(ids).await?)
    }

    /// 立即按保留天数清理
    pub async fn cleanup_now(&self) -> Result<u64, AppError> {
        Ok(self.cleaner.trigger_cleanup().await?)
    }

    // ========== 生命周期 ==========

    /// 启动定时同步和历史清理
    pub async fn start_background(&self) {
        self.start_sync().await;

        let mut cleanup = self.cleanup_task.lock().await;
        if cleanup.is_none() {
            *cleanup = Some(self.cleaner.clone().start_cleanup_task());
        }
    }

    /// 关闭引擎：停止后台任务，丢弃之后到达的刷新结果
    pub async fn shutdown(&self) {
        self.lifetime.cancel();
        self.scheduler.stop().await;
        if let Some(task) = self.cleanup_task.lock().await.take() {
            task.abort();
        }
        info!("引擎已关闭");
    }
}

/// 应用程序入口点
pub fn run() {
    if let Err(e) = logger::init(&logger::default_log_dir()) {
        eprintln!("日志系统初始化失败: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("创建异步运行时失败: {}", e);
            return;
        }
    };

    if let Err(e) = runtime.block_on(serve(StorageConfig::new(default_data_dir()))) {
        error!("应用异常退出: {:#}", e);
    }
}

async fn serve(config: StorageConfig) -> anyhow::Result<()> {
    info!("初始化引用跟踪引擎...");
    let app = CiteTrack::open(config).await?;

    // 无界面模式下由日志代替通知展示
    let mut events = app.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AppEvent::NotificationDue { event, .. }) => {
                    info!(
                        "[通知] {} 引用数 {} -> {} ({:+})",
                        event.scholar_name, event.previous_count, event.new_count, event.delta
                    );
                }
                Ok(AppEvent::BatchNotificationDue {
                    events,
                    total_increase,
                    total_decrease,
                    ..
                }) => {
                    info!(
                        "[通知] {} 位学者引用数变化，共增加 {}，减少 {}",
                        events.len(),
                        total_increase,
                        total_decrease
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("通知订阅落后，跳过 {} 个事件", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    app.start_background().await;
    info!("引擎已启动，按 Ctrl-C 退出");

    tokio::signal::ctrl_c().await?;
    app.shutdown().await;
    Ok(())
}
