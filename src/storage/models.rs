// 数据模型定义 - 学者与引用历史实体

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 同一学者两条历史记录之间的最小时间间隔（秒），窗口内视为重复
pub const DEDUP_WINDOW_SECS: i64 = 60;

/// 将时间截断到毫秒精度（数据库以毫秒存储）
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(dt.timestamp_millis())
        .single()
        .unwrap_or(dt)
}

/// 学者未设置姓名时的默认显示名
pub fn default_scholar_name(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("Scholar {}", prefix)
}

/// 被跟踪的学者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarRecord {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    /// 引用数快照，与最新一条历史记录保持一致
    #[serde(rename = "citations", default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ScholarRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let display_name = if name.trim().is_empty() {
            default_scholar_name(&id)
        } else {
            name.trim().to_string()
        };
        Self {
            id,
            display_name,
            citation_count: None,
            last_updated: None,
        }
    }

    pub fn with_snapshot(
        mut self,
        citation_count: Option<i64>,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        self.citation_count = citation_count;
        self.last_updated = last_updated;
        self
    }
}

/// 历史记录来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Automatic,
    Manual,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Automatic => "automatic",
            DataSource::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "automatic" => Some(DataSource::Automatic),
            "manual" => Some(DataSource::Manual),
            _ => None,
        }
    }
}

/// 一条引用数读数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub scholar_id: String,
    pub citation_count: i64,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        scholar_id: impl Into<String>,
        citation_count: i64,
        timestamp: DateTime<Utc>,
        source: DataSource,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scholar_id: scholar_id.into(),
            citation_count,
            timestamp: truncate_to_millis(timestamp),
            source,
            created_at: truncate_to_millis(Utc::now()),
        }
    }

    /// 自动抓取产生的读数
    pub fn automatic(scholar_id: impl Into<String>, citation_count: i64, timestamp: DateTime<Utc>) -> Self {
        Self::new(scholar_id, citation_count, timestamp, DataSource::Automatic)
    }

    pub fn is_valid(&self) -> bool {
        !self.scholar_id.is_empty() && self.citation_count >= 0
    }

    /// 两条记录是否落在去重窗口内
    pub fn within_dedup_window(&self, other: &DateTime<Utc>) -> bool {
        (self.timestamp - *other).num_milliseconds().abs() <= DEDUP_WINDOW_SECS * 1000
    }
}

/// 预设的查询时间窗
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeRange {
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
    /// 自定义范围，起止时间由调用方提供
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeRange {
    /// 解析为具体的起止时间（闭区间）
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = match self {
            TimeRange::LastWeek => now - Duration::weeks(1),
            TimeRange::LastMonth => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
            TimeRange::LastQuarter => now
                .checked_sub_months(Months::new(3))
                .unwrap_or(now - Duration::days(90)),
            TimeRange::LastYear => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now - Duration::days(365)),
            TimeRange::Custom { start, end } => return (*start, *end),
        };
        (start, now)
    }
}

/// 数据统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStatistics {
    pub total_scholars: usize,
    pub total_history_records: i64,
    pub scholars_with_history: i64,
    pub oldest_record: Option<DateTime<Utc>>,
    pub newest_record: Option<DateTime<Utc>>,
}

/// 单个学者在某时间段内的引用统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationStatistics {
    pub total_entries: usize,
    pub first_entry: Option<DateTime<Utc>>,
    pub last_entry: Option<DateTime<Utc>>,
    pub current_citations: Option<i64>,
    pub total_change: i64,
    pub average_daily_change: f64,
    /// 增长率（百分比）
    pub growth_rate: f64,
    pub peak_citations: i64,
    pub peak_date: Option<DateTime<Utc>>,
}

impl CitationStatistics {
    /// 由升序排列的历史记录计算统计
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let first = entries.first();
        let last = entries.last();

        let (total_change, average_daily_change, growth_rate) = match (first, last) {
            (Some(first), Some(last)) => {
                let change = last.citation_count - first.citation_count;
                let days = (last.timestamp - first.timestamp).num_days();
                let daily = if days > 0 {
                    change as f64 / days as f64
                } else {
                    0.0
                };
                let growth = if first.citation_count > 0 {
                    change as f64 / first.citation_count as f64 * 100.0
                } else {
                    0.0
                };
                (change, daily, growth)
            }
            _ => (0, 0.0, 0.0),
        };

        let peak = entries.iter().max_by_key(|e| e.citation_count);

        Self {
            total_entries: entries.len(),
            first_entry: first.map(|e| e.timestamp),
            last_entry: last.map(|e| e.timestamp),
            current_citations: last.map(|e| e.citation_count),
            total_change,
            average_daily_change,
            growth_rate,
            peak_citations: peak.map(|e| e.citation_count).unwrap_or(0),
            peak_date: peak.map(|e| e.timestamp),
        }
    }
}
