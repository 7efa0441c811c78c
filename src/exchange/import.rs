use super::format::{detect_payload, parse_entry, parse_scholar, parse_settings, ParsedEntry};
use super::Reconciler;
use crate::error::{ImportError, StoreError};
use crate::models::{default_scholar_name, ImportSummary, ScholarRecord, SettingsUpdate};
use crate::storage::HistoryEntry;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// 导入结果：计数 + 负载中携带的设置（由调用方决定是否应用）
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub settings: Option<SettingsUpdate>,
}

impl Reconciler {
    /// 合并导入负载；只有整体格式无法识别时才失败，单条坏数据跳过并计数
    pub async fn import(&self, bytes: &[u8]) -> Result<ImportOutcome, ImportError> {
        let payload = detect_payload(bytes)?;
        info!("识别到导入格式: {}", payload.kind());

        let parts = payload.into_parts();
        let mut summary = ImportSummary::default();

        // 1. 显式的学者记录：按ID插入或覆盖
        let mut explicit_ids = HashSet::new();
        for value in &parts.scholars {
            match parse_scholar(value) {
                Some(scholar) => {
                    explicit_ids.insert(scholar.id.clone());
                    self.registry.upsert(scholar).await?;
                    summary.imported_scholars += 1;
                }
                None => warn!("跳过缺少ID的学者记录"),
            }
        }

        // 2. 解析读数
        let mut entries: Vec<ParsedEntry> = Vec::with_capacity(parts.history.len());
        for value in &parts.history {
            match parse_entry(value) {
                Some(entry) => entries.push(entry),
                None => summary.skipped_entries += 1,
            }
        }

        // 3. 没有显式记录的学者：以时间最新的读数合成快照
        let mut latest_by_scholar: BTreeMap<&str, &ParsedEntry> = BTreeMap::new();
        for entry in &entries {
            let slot = latest_by_scholar
                .entry(entry.scholar_id.as_str())
                .or_insert(entry);
            if entry.timestamp > slot.timestamp {
                *slot = entry;
            }
        }

        for (scholar_id, latest) in latest_by_scholar {
            if explicit_ids.contains(scholar_id) {
                continue;
            }

            match self.registry.get(scholar_id).await {
                None => {
                    let name = latest
                        .scholar_name
                        .clone()
                        .unwrap_or_else(|| default_scholar_name(scholar_id));
                    let scholar = ScholarRecord::new(scholar_id, name)
                        .with_snapshot(Some(latest.citation_count), Some(latest.timestamp));
                    self.registry.upsert(scholar).await?;
                    summary.imported_scholars += 1;
                }
                Some(existing) => {
                    let newer = existing
                        .last_updated
                        .map_or(true, |updated| latest.timestamp > updated);
                    if newer {
                        self.registry
                            .apply_snapshot(scholar_id, None, latest.citation_count, latest.timestamp)
                            .await?;
                    }
                }
            }
        }

        // 4. 读数统一走 append，60 秒去重规则与来源无关
        for entry in &entries {
            let history =
                HistoryEntry::automatic(&entry.scholar_id, entry.citation_count, entry.timestamp);
            match self.store.append(history).await {
                Ok(true) => summary.imported_history_entries += 1,
                Ok(false) => summary.duplicate_entries += 1,
                Err(StoreError::InvalidEntry(reason)) => {
                    warn!("跳过无效读数: {}", reason);
                    summary.skipped_entries += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let settings = parts.settings.as_ref().and_then(parse_settings);

        info!(
            "导入完成: {} 位学者, {} 条读数 (重复 {}, 跳过 {})",
            summary.imported_scholars,
            summary.imported_history_entries,
            summary.duplicate_entries,
            summary.skipped_entries
        );
        Ok(ImportOutcome { summary, settings })
    }

    /// 从文件导入
    pub async fn import_from_file(&self, path: &Path) -> Result<ImportOutcome, ImportError> {
        let bytes = tokio::fs::read(path).await.map_err(StoreError::from)?;
        self.import(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateInterval;
    use crate::storage::{HistoryStore, ScholarRegistry, StorageConfig};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    async fn reconciler() -> (TempDir, Reconciler, HistoryStore, Arc<ScholarRegistry>) {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let registry = Arc::new(ScholarRegistry::open(config.scholars_path()).await.unwrap());
        let store = HistoryStore::open_sqlite(&config, registry.clone()).await.unwrap();
        let reconciler = Reconciler::new(store.clone(), registry.clone());
        (dir, reconciler, store, registry)
    }

    #[tokio::test]
    async fn test_flat_array_synthesizes_scholar_from_latest_entry() {
        let (_dir, reconciler, store, registry) = reconciler().await;
        let payload = json!([
            {"scholarId": "x", "scholarName": "A (new)", "timestamp": "2024-02-01T00:00:00Z", "citationCount": 15},
            {"scholarId": "x", "scholarName": "A", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 10},
            {"scholarId": "x", "timestamp": "not a date", "citationCount": 11},
        ]);

        let outcome = reconciler
            .import(payload.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(outcome.summary.imported_scholars, 1);
        assert_eq!(outcome.summary.imported_history_entries, 2);
        assert_eq!(outcome.summary.skipped_entries, 1);

        let scholar = registry.get("x").await.unwrap();
        assert_eq!(scholar.display_name, "A (new)", "应取时间最新的条目的名字");
        assert_eq!(scholar.citation_count, Some(15));
        assert_eq!(store.count_for("x").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reimport_is_deduplicated() {
        let (_dir, reconciler, store, _) = reconciler().await;
        let payload = json!([
            {"scholarId": "x", "scholarName": "A", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 10},
        ])
        .to_string();

        reconciler.import(payload.as_bytes()).await.unwrap();
        let second = reconciler.import(payload.as_bytes()).await.unwrap();

        assert_eq!(second.summary.imported_history_entries, 0);
        assert_eq!(second.summary.duplicate_entries, 1);
        assert_eq!(second.summary.imported_scholars, 0, "已存在的学者不重复计数");
        assert_eq!(store.count_for("x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrapped_payload_upserts_explicit_scholars_and_settings() {
        let (_dir, reconciler, _, registry) = reconciler().await;
        registry
            .add(ScholarRecord::new("x", "Old Name"))
            .await
            .unwrap();

        let payload = json!({
            "version": "1.1",
            "exportDate": "2024-03-01T00:00:00Z",
            "scholars": [
                {"id": "x", "name": "New Name", "citations": 99, "lastUpdated": "2024-03-01T00:00:00Z"},
                {"name": "missing id"}
            ],
            "citationHistory": [
                {"scholarId": "x", "scholarName": "ignored", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 50},
                {"scholarId": "y", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 5}
            ],
            "settings": {"updateInterval": 604800, "language": "en"}
        });

        let outcome = reconciler
            .import(payload.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(outcome.summary.imported_scholars, 2);
        assert_eq!(outcome.summary.imported_history_entries, 2);
        assert_eq!(
            outcome.settings.and_then(|s| s.update_interval),
            Some(UpdateInterval::OneWeek)
        );

        let x = registry.get("x").await.unwrap();
        assert_eq!(x.display_name, "New Name");
        assert_eq!(x.citation_count, Some(99), "显式记录的快照不被历史覆盖");

        let y = registry.get("y").await.unwrap();
        assert_eq!(y.display_name, "Scholar y");
        assert_eq!(y.citation_count, Some(5));
    }

    #[tokio::test]
    async fn test_existing_scholar_snapshot_only_moves_forward() {
        let (_dir, reconciler, _, registry) = reconciler().await;
        let recent = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        registry
            .add(ScholarRecord::new("x", "A").with_snapshot(Some(300), Some(recent)))
            .await
            .unwrap();

        let older = json!({"data": [
            {"scholarId": "x", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 100}
        ]});
        reconciler.import(older.to_string().as_bytes()).await.unwrap();
        assert_eq!(registry.get("x").await.unwrap().citation_count, Some(300));

        let newer = json!({"data": [
            {"scholarId": "x", "timestamp": "2024-07-01T00:00:00Z", "citationCount": 320}
        ]});
        reconciler.import(newer.to_string().as_bytes()).await.unwrap();
        assert_eq!(registry.get("x").await.unwrap().citation_count, Some(320));
    }

    #[tokio::test]
    async fn test_unrecognized_format_fails_wholesale() {
        let (_dir, reconciler, _, registry) = reconciler().await;
        let result = reconciler.import(br#"{"hello": "world"}"#).await;
        assert!(matches!(result, Err(ImportError::UnrecognizedFormat)));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_import_into_unavailable_store() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(
            ScholarRegistry::open(dir.path().join("scholars.json"))
                .await
                .unwrap(),
        );
        let reconciler = Reconciler::new(HistoryStore::unavailable(), registry);
        let payload = json!([
            {"scholarId": "x", "timestamp": "2024-01-01T00:00:00Z", "citationCount": 1}
        ]);

        let result = reconciler.import(payload.to_string().as_bytes()).await;
        assert!(matches!(
            result,
            Err(ImportError::Store(StoreError::Unavailable))
        ));
    }
}
