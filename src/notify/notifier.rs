// 通知策略 - 决定一次变化是否需要展示，以及走哪些渠道
//
// 真正的展示（系统通知、弹窗、菜单栏）由订阅事件总线的外部组件完成

use crate::event_bus::{AppEvent, EventBus};
use crate::models::{ChangeEvent, NotificationSettings, NotificationType};
use crate::settings::SettingsManager;
use chrono::{Local, Timelike};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 最近变化记录的上限
pub const MAX_RECENT: usize = 50;

pub struct ChangeNotifier {
    bus: Arc<EventBus>,
    settings: Arc<SettingsManager>,
    recent: Mutex<VecDeque<ChangeEvent>>,
}

impl ChangeNotifier {
    pub fn new(bus: Arc<EventBus>, settings: Arc<SettingsManager>) -> Self {
        Self {
            bus,
            settings,
            recent: Mutex::new(VecDeque::with_capacity(MAX_RECENT)),
        }
    }

    /// 处理单个变化，按本地时间判断免打扰；返回实际发出的渠道
    pub async fn notify(&self, event: &ChangeEvent) -> Vec<NotificationType> {
        self.notify_at(event, Local::now().hour()).await
    }

    pub async fn notify_at(&self, event: &ChangeEvent, hour: u32) -> Vec<NotificationType> {
        let settings = self.settings.get().await.notification;
        if !settings.enabled || !event.significant {
            return Vec::new();
        }

        self.remember(event.clone());

        let channels = deliverable_channels(&settings, hour);
        if channels.is_empty() {
            debug!("学者 {} 的变化通知被免打扰或渠道设置拦截", event.scholar_id);
            return channels;
        }

        info!(
            "引用变化通知: {} {:+} ({} -> {})",
            event.scholar_name, event.delta, event.previous_count, event.new_count
        );
        self.bus.publish(AppEvent::NotificationDue {
            event: event.clone(),
            channels: channels.clone(),
        });
        channels
    }

    /// 批量刷新后的汇总通知
    pub async fn notify_batch(&self, events: &[ChangeEvent]) -> Vec<NotificationType> {
        self.notify_batch_at(events, Local::now().hour()).await
    }

    pub async fn notify_batch_at(&self, events: &[ChangeEvent], hour: u32) -> Vec<NotificationType> {
        let significant: Vec<ChangeEvent> =
            events.iter().filter(|e| e.significant).cloned().collect();

        match significant.len() {
            0 => Vec::new(),
            1 => self.notify_at(&significant[0], hour).await,
            _ => {
                let settings = self.settings.get().await.notification;
                if !settings.enabled {
                    return Vec::new();
                }
                for event in &significant {
                    self.remember(event.clone());
                }

                let channels = deliverable_channels(&settings, hour);
                if channels.is_empty() {
                    return channels;
                }

                let total_increase = significant.iter().filter(|e| e.delta > 0).map(|e| e.delta).sum();
                let total_decrease = significant
                    .iter()
                    .filter(|e| e.delta < 0)
                    .map(|e| e.delta.abs())
                    .sum();

                info!("{} 位学者的引用数有显著变化", significant.len());
                self.bus.publish(AppEvent::BatchNotificationDue {
                    events: significant,
                    total_increase,
                    total_decrease,
                    channels: channels.clone(),
                });
                channels
            }
        }
    }

    /// 最近的显著变化，最新的在前
    pub fn recent(&self) -> Vec<ChangeEvent> {
        self.recent
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_recent(&self) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.clear();
        }
    }

    fn remember(&self, event: ChangeEvent) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.push_front(event);
            recent.truncate(MAX_RECENT);
        }
    }
}

/// 免打扰时段内返回空列表，否则返回启用的渠道
fn deliverable_channels(settings: &NotificationSettings, hour: u32) -> Vec<NotificationType> {
    if settings
        .quiet_hours
        .as_ref()
        .is_some_and(|q| q.is_quiet_hour(hour))
    {
        return Vec::new();
    }
    settings.enabled_types.iter().copied().collect()
}
