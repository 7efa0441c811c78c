// 学者列表 - 有序 JSON 数组持久化
//
// 每次修改后整文件写回，写入先落临时文件再 rename

use super::models::ScholarRecord;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct ScholarRegistry {
    path: PathBuf,
    scholars: RwLock<Vec<ScholarRecord>>,
}

impl ScholarRegistry {
    /// 打开学者列表文件，不存在时为空列表；损坏时原文件改名为 .json.corrupt 后从空列表开始
    pub async fn open(path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let scholars = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                match serde_json::from_slice::<Vec<ScholarRecord>>(&bytes) {
                    Ok(list) => list,
                    Err(e) => {
                        let backup = path.with_extension("json.corrupt");
                        tokio::fs::rename(&path, &backup).await?;
                        warn!(
                            "学者列表文件损坏，已移到 {}，使用空列表: {}",
                            backup.display(),
                            e
                        );
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        info!("已加载 {} 位学者", scholars.len());
        Ok(Self {
            path,
            scholars: RwLock::new(scholars),
        })
    }

    pub async fn list(&self) -> Vec<ScholarRecord> {
        self.scholars.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ScholarRecord> {
        self.scholars
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.scholars.read().await.iter().any(|s| s.id == id)
    }

    pub async fn len(&self) -> usize {
        self.scholars.read().await.len()
    }

    /// 添加学者到列表末尾，已存在时返回 Duplicate
    pub async fn add(&self, scholar: ScholarRecord) -> StoreResult<ScholarRecord> {
        let mut scholars = self.scholars.write().await;
        if scholars.iter().any(|s| s.id == scholar.id) {
            return Err(StoreError::Duplicate(scholar.id));
        }

        let scholar = ScholarRecord::new(scholar.id.clone(), scholar.display_name.clone())
            .with_snapshot(scholar.citation_count, scholar.last_updated);
        scholars.push(scholar.clone());
        self.save(&scholars).await?;

        info!("添加学者: {} ({})", scholar.display_name, scholar.id);
        Ok(scholar)
    }

    /// 移除学者，返回被移除的记录
    pub async fn remove(&self, id: &str) -> StoreResult<Option<ScholarRecord>> {
        let mut scholars = self.scholars.write().await;
        let Some(index) = scholars.iter().position(|s| s.id == id) else {
            return Ok(None);
        };

        let removed = scholars.remove(index);
        self.save(&scholars).await?;
        Ok(Some(removed))
    }

    /// 将 from 位置的学者移动到 to 位置
    pub async fn reorder(&self, from: usize, to: usize) -> StoreResult<()> {
        let mut scholars = self.scholars.write().await;
        if from >= scholars.len() || to >= scholars.len() {
            return Err(StoreError::NotFound(format!(
                "位置越界: {} -> {} (共 {} 位)",
                from,
                to,
                scholars.len()
            )));
        }
        if from == to {
            return Ok(());
        }

        let scholar = scholars.remove(from);
        scholars.insert(to, scholar);
        self.save(&scholars).await
    }

    /// 按ID插入或覆盖（名称与快照取传入值），返回是否为新建
    pub async fn upsert(&self, scholar: ScholarRecord) -> StoreResult<bool> {
        let mut scholars = self.scholars.write().await;
        let created = match scholars.iter_mut().find(|s| s.id == scholar.id) {
            Some(existing) => {
                existing.display_name = scholar.display_name;
                existing.citation_count = scholar.citation_count;
                existing.last_updated = scholar.last_updated;
                false
            }
            None => {
                scholars.push(scholar);
                true
            }
        };

        self.save(&scholars).await?;
        Ok(created)
    }

    /// 更新学者的引用数快照，学者不存在时返回 false
    pub async fn apply_snapshot(
        &self,
        id: &str,
        name: Option<&str>,
        citation_count: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut scholars = self.scholars.write().await;
        let Some(scholar) = scholars.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };

        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            scholar.display_name = name.to_string();
        }
        scholar.citation_count = Some(citation_count);
        scholar.last_updated = Some(at);

        self.save(&scholars).await?;
        Ok(true)
    }

    async fn save(&self, scholars: &[ScholarRecord]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(scholars)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
