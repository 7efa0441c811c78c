// 引用变化检测

use crate::models::{ChangeEvent, HistoryEntry};
use chrono::{DateTime, Utc};

/// 比较新读数与上一条记录；首次读数和零变化不产生事件
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    threshold: i64,
}

impl ChangeDetector {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn detect(
        &self,
        previous: Option<&HistoryEntry>,
        scholar_id: &str,
        scholar_name: &str,
        new_count: i64,
        timestamp: DateTime<Utc>,
    ) -> Option<ChangeEvent> {
        let previous = previous?;
        let delta = new_count - previous.citation_count;
        if delta == 0 {
            return None;
        }

        Some(ChangeEvent {
            scholar_id: scholar_id.to_string(),
            scholar_name: scholar_name.to_string(),
            previous_count: previous.citation_count,
            new_count,
            delta,
            timestamp,
            significant: delta.abs() >= self.threshold,
        })
    }
}
