// 数据模型模块 - 应用配置、通知设置与运行结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

// 重新导出存储层的实体
pub use crate::storage::{
    default_scholar_name, CitationStatistics, DataSource, DataStatistics, HistoryEntry,
    ScholarRecord, TimeRange,
};

/// 自动更新间隔（30 分钟到 1 周之间的常用档位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateInterval {
    ThirtyMinutes,
    OneHour,
    TwoHours,
    SixHours,
    TwelveHours,
    OneDay,
    ThreeDays,
    OneWeek,
}

impl UpdateInterval {
    pub const ALL: [UpdateInterval; 8] = [
        UpdateInterval::ThirtyMinutes,
        UpdateInterval::OneHour,
        UpdateInterval::TwoHours,
        UpdateInterval::SixHours,
        UpdateInterval::TwelveHours,
        UpdateInterval::OneDay,
        UpdateInterval::ThreeDays,
        UpdateInterval::OneWeek,
    ];

    pub fn as_secs(&self) -> u64 {
        match self {
            Self::ThirtyMinutes => 1800,
            Self::OneHour => 3600,
            Self::TwoHours => 7200,
            Self::SixHours => 21_600,
            Self::TwelveHours => 43_200,
            Self::OneDay => 86_400,
            Self::ThreeDays => 259_200,
            Self::OneWeek => 604_800,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    /// 从秒数还原档位，不在档位内返回 None
    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_secs() == secs)
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        UpdateInterval::OneDay
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    System,
    Popup,
    MenuBar,
}

/// 免打扰时段（小时，0-23）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub enabled: bool,
}

impl QuietHours {
    /// 给定小时是否处于免打扰时段，支持跨午夜
    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// 通知设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    /// 变化量达到该阈值视为显著
    pub threshold: i64,
    pub enabled_types: BTreeSet<NotificationType>,
    pub quiet_hours: Option<QuietHours>,
    pub sound_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            enabled_types: [NotificationType::System, NotificationType::MenuBar]
                .into_iter()
                .collect(),
            quiet_hours: Some(QuietHours {
                start_hour: 22,
                end_hour: 8,
                enabled: true,
            }),
            sound_enabled: true,
        }
    }
}

/// 重试设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// 持久化的应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// 自动更新间隔
    pub update_interval: UpdateInterval,
    /// 通知设置
    pub notification: NotificationSettings,
    /// 抓取重试设置
    pub retry: RetrySettings,
    /// 全局最小请求间隔（毫秒）
    pub min_request_interval_ms: u64,
    /// 历史数据保留天数
    pub retention_days: i64,
    /// 是否启用自动清理
    pub auto_cleanup_enabled: bool,
    /// 上次完成同步的时间
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            update_interval: UpdateInterval::default(),
            notification: NotificationSettings::default(),
            retry: RetrySettings::default(),
            min_request_interval_ms: 1000,
            retention_days: 365,
            auto_cleanup_enabled: false,
            last_sync_time: None,
        }
    }
}

/// 配置更新（仅更新提供的字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub update_interval: Option<UpdateInterval>,
    pub notification: Option<NotificationSettings>,
    pub retry: Option<RetrySettings>,
    pub min_request_interval_ms: Option<u64>,
    pub retention_days: Option<i64>,
    pub auto_cleanup_enabled: Option<bool>,
}

/// 引用数变化事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub scholar_id: String,
    pub scholar_name: String,
    pub previous_count: i64,
    pub new_count: i64,
    pub delta: i64,
    pub timestamp: DateTime<Utc>,
    pub significant: bool,
}

/// 批量刷新结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub total: usize,
    pub change_events: Vec<ChangeEvent>,
    /// (学者ID, 错误信息)
    pub failures: Vec<(String, String)>,
    pub last_error: Option<String>,
}

/// 导入结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported_scholars: usize,
    pub imported_history_entries: usize,
    /// 因 60 秒去重而未写入的条目
    pub duplicate_entries: usize,
    /// 字段缺失或时间戳无法解析而跳过的条目
    pub skipped_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_hours_span_midnight() {
        let quiet = QuietHours {
            start_hour: 22,
            end_hour: 8,
            enabled: true,
        };
        assert!(quiet.is_quiet_hour(23));
        assert!(quiet.is_quiet_hour(0));
        assert!(quiet.is_quiet_hour(7));
        assert!(!quiet.is_quiet_hour(8));
        assert!(!quiet.is_quiet_hour(12));
    }

    #[test]
    fn test_quiet_hours_same_day_and_disabled() {
        let mut quiet = QuietHours {
            start_hour: 9,
            end_hour: 17,
            enabled: true,
        };
        assert!(quiet.is_quiet_hour(9));
        assert!(!quiet.is_quiet_hour(17));
        quiet.enabled = false;
        assert!(!quiet.is_quiet_hour(12));
    }

    #[test]
    fn test_update_interval_secs() {
        assert_eq!(UpdateInterval::from_secs(1800), Some(UpdateInterval::ThirtyMinutes));
        assert_eq!(UpdateInterval::OneWeek.as_secs(), 7 * 86_400);
        assert_eq!(UpdateInterval::from_secs(42), None);
    }

    #[test]
    fn test_settings_missing_fields_use_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"updateInterval":"oneHour"}"#).unwrap();
        assert_eq!(settings.update_interval, UpdateInterval::OneHour);
        assert_eq!(settings.notification.threshold, 5);
        assert_eq!(settings.retry.max_attempts, 3);
    }
}
