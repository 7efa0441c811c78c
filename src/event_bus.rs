// 事件总线 - 刷新结果、引用变化和通知经这里广播给展示层

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::models::{ChangeEvent, ImportSummary, NotificationType, RefreshSummary};

/// 应用事件枚举 - 定义所有可能的系统事件
#[derive(Debug, Clone)]
pub enum AppEvent {
    // --- 刷新事件 ---

    /// 单个学者刷新成功
    ScholarRefreshed {
        scholar_id: String,
        name: String,
        citation_count: i64,
        timestamp: DateTime<Utc>,
    },

    /// 单个学者刷新失败
    ScholarRefreshFailed {
        scholar_id: String,
        error: String,
    },

    /// 引用数发生变化
    CitationChanged(ChangeEvent),

    /// 批量刷新完成
    RefreshCompleted(RefreshSummary),

    // --- 通知事件 ---

    /// 需要向用户展示的通知（已通过免打扰与渠道过滤）
    NotificationDue {
        event: ChangeEvent,
        channels: Vec<NotificationType>,
    },

    /// 一次批量刷新中有多条显著变化时的汇总通知
    BatchNotificationDue {
        events: Vec<ChangeEvent>,
        total_increase: i64,
        total_decrease: i64,
        channels: Vec<NotificationType>,
    },

    // --- 数据事件 ---

    /// 学者列表变化（添加、删除、排序、导入）
    ScholarsChanged,

    /// 导入完成
    HistoryImported(ImportSummary),

    // --- 系统事件 ---

    /// 配置更新事件
    SettingsUpdated,
}

impl AppEvent {
    /// 事件名，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ScholarRefreshed { .. } => "scholar_refreshed",
            AppEvent::ScholarRefreshFailed { .. } => "scholar_refresh_failed",
            AppEvent::CitationChanged(_) => "citation_changed",
            AppEvent::RefreshCompleted(_) => "refresh_completed",
            AppEvent::NotificationDue { .. } => "notification_due",
            AppEvent::BatchNotificationDue { .. } => "batch_notification_due",
            AppEvent::ScholarsChanged => "scholars_changed",
            AppEvent::HistoryImported(_) => "history_imported",
            AppEvent::SettingsUpdated => "settings_updated",
        }
    }
}

/// 引擎事件总线
///
/// 展示层（通知、菜单栏、列表刷新）订阅这里的事件，引擎内部不直接调用它们
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// `capacity` 是每个订阅者可积压的事件数，超出后慢订阅者会收到 Lagged
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件；没有订阅者时直接丢弃
    pub fn publish(&self, event: AppEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!("事件 {} 已送达 {} 个订阅者", name, receivers),
            Err(_) => tracing::trace!("事件 {} 无订阅者，已丢弃", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
