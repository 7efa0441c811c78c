use super::format::{
    format_timestamp, ExportEntry, ExportShape, ExportedSettings, WrappedExport, EXPORT_VERSION,
};
use super::Reconciler;
use crate::error::{StoreError, StoreResult};
use crate::models::AppSettings;
use crate::storage::HistoryEntry;
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

impl Reconciler {
    /// 按学者列表顺序生成全部读数；没有历史但有快照的学者合成一条
    pub async fn export_entries(&self) -> StoreResult<Vec<ExportEntry>> {
        let scholars = self.registry.list().await;
        let mut entries = Vec::new();

        for scholar in &scholars {
            let history: Vec<HistoryEntry> = match self.store.history_of(&scholar.id).await {
                Ok(history) => history,
                Err(StoreError::Unavailable) => {
                    warn!("存储不可用，学者 {} 仅导出快照", scholar.id);
                    Vec::new()
                }
                Err(e) => return Err(e),
            };

            if history.is_empty() {
                if let Some(count) = scholar.citation_count {
                    let at = scholar.last_updated.unwrap_or_else(Utc::now);
                    entries.push(ExportEntry::new(&scholar.id, &scholar.display_name, at, count));
                }
                continue;
            }

            entries.extend(history.iter().map(|h| {
                ExportEntry::new(&scholar.id, &scholar.display_name, h.timestamp, h.citation_count)
            }));
        }

        Ok(entries)
    }

    /// 导出为 JSON；包装格式附带学者列表和（可选的）设置
    pub async fn export(&self, shape: ExportShape, settings: Option<&AppSettings>) -> StoreResult<Vec<u8>> {
        let entries = self.export_entries().await?;
        let count = entries.len();

        let bytes = match shape {
            ExportShape::FlatArray => serde_json::to_vec_pretty(&entries)?,
            ExportShape::Wrapped => {
                let wrapped = WrappedExport {
                    scholars: self.registry.list().await,
                    citation_history: entries,
                    export_date: format_timestamp(Utc::now()),
                    version: EXPORT_VERSION.to_string(),
                    settings: settings.map(|s| ExportedSettings {
                        update_interval: s.update_interval,
                        notification: s.notification.clone(),
                    }),
                };
                serde_json::to_vec_pretty(&wrapped)?
            }
        };

        info!("导出 {} 条读数 ({:?})", count, shape);
        Ok(bytes)
    }

    /// 导出到文件（整文件覆盖）
    pub async fn export_to_file(
        &self,
        path: &Path,
        shape: ExportShape,
        settings: Option<&AppSettings>,
    ) -> StoreResult<()> {
        let bytes = self.export(shape, settings).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        info!("导出文件已写入: {:?}", path);
        Ok(())
    }
}
