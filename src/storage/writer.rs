// Store Writer Actor - 历史数据的唯一写入者
//
// 所有修改操作排队串行执行，"检查去重窗口再插入"因此对其他写入者是原子的

use super::models::*;
use super::registry::ScholarRegistry;
use super::repository::HistoryRepository;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// 一次抓取读数写入的结果
#[derive(Debug, Clone)]
pub struct ReadingOutcome {
    /// 写入前的最新记录
    pub previous: Option<HistoryEntry>,
    /// 是否实际写入了新记录（去重窗口内则为 false）
    pub written: bool,
}

/// 写入命令
pub enum WriterCommand {
    Append {
        entry: HistoryEntry,
        reply: oneshot::Sender<StoreResult<bool>>,
    },

    /// 写入抓取读数并更新学者快照
    RecordReading {
        scholar_id: String,
        name: Option<String>,
        citation_count: i64,
        at: DateTime<Utc>,
        reply: oneshot::Sender<StoreResult<ReadingOutcome>>,
    },

    UpdateCount {
        entry_id: String,
        citation_count: i64,
        reply: oneshot::Sender<StoreResult<HistoryEntry>>,
    },

    DeleteAll {
        scholar_id: String,
        reply: oneshot::Sender<StoreResult<u64>>,
    },

    DeleteOlderThan {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<StoreResult<u64>>,
    },

    DeleteMany {
        ids: Vec<String>,
        reply: oneshot::Sender<StoreResult<u64>>,
    },

    RestoreToPoint {
        scholar_id: String,
        point: HistoryEntry,
        reply: oneshot::Sender<StoreResult<u64>>,
    },

    /// 级联删除学者及其历史
    RemoveScholar {
        scholar_id: String,
        reply: oneshot::Sender<StoreResult<Option<ScholarRecord>>>,
    },
}

pub struct StoreWriterActor {
    receiver: mpsc::Receiver<WriterCommand>,
    repo: Arc<dyn HistoryRepository>,
    registry: Arc<ScholarRegistry>,
}

impl StoreWriterActor {
    pub fn new(
        repo: Arc<dyn HistoryRepository>,
        registry: Arc<ScholarRegistry>,
    ) -> (Self, StoreWriterHandle) {
        let (sender, receiver) = mpsc::channel(100);
        let actor = Self {
            receiver,
            repo,
            registry,
        };
        let handle = StoreWriterHandle { sender };
        (actor, handle)
    }

    pub async fn run(mut self) {
        tracing::info!("Store Writer Actor 已启动 ({})", self.repo.db_type());

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                WriterCommand::Append { entry, reply } => {
                    let _ = reply.send(self.append(&entry).await);
                }

                WriterCommand::RecordReading {
                    scholar_id,
                    name,
                    citation_count,
                    at,
                    reply,
                } => {
                    let result = self
                        .record_reading(&scholar_id, name.as_deref(), citation_count, at)
                        .await;
                    let _ = reply.send(result);
                }

                WriterCommand::UpdateCount {
                    entry_id,
                    citation_count,
                    reply,
                } => {
                    let _ = reply.send(self.update_count(&entry_id, citation_count).await);
                }

                WriterCommand::DeleteAll { scholar_id, reply } => {
                    let _ = reply.send(self.repo.delete_by_scholar(&scholar_id).await);
                }

                WriterCommand::DeleteOlderThan { cutoff, reply } => {
                    let _ = reply.send(self.repo.delete_older_than(cutoff).await);
                }

                WriterCommand::DeleteMany { ids, reply } => {
                    let _ = reply.send(self.repo.delete_by_ids(&ids).await);
                }

                WriterCommand::RestoreToPoint {
                    scholar_id,
                    point,
                    reply,
                } => {
                    let _ = reply.send(self.restore_to_point(&scholar_id, &point).await);
                }

                WriterCommand::RemoveScholar { scholar_id, reply } => {
                    let _ = reply.send(self.remove_scholar(&scholar_id).await);
                }
            }
        }

        tracing::info!("Store Writer Actor 已停止");
    }

    async fn append(&self, entry: &HistoryEntry) -> StoreResult<bool> {
        if !entry.is_valid() {
            return Err(StoreError::InvalidEntry(format!(
                "scholar_id='{}', citation_count={}",
                entry.scholar_id, entry.citation_count
            )));
        }

        if self
            .repo
            .has_entry_near(
                &entry.scholar_id,
                entry.timestamp,
                DEDUP_WINDOW_SECS * 1000,
            )
            .await?
        {
            tracing::debug!(
                "跳过重复记录: {} @ {}",
                entry.scholar_id,
                entry.timestamp
            );
            return Ok(false);
        }

        self.repo.insert_entry(entry).await?;
        Ok(true)
    }

    async fn record_reading(
        &self,
        scholar_id: &str,
        name: Option<&str>,
        citation_count: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<ReadingOutcome> {
        // 抓取期间学者可能已被移除，此时不能留下无主记录
        if !self.registry.contains(scholar_id).await {
            return Err(StoreError::NotFound(scholar_id.to_string()));
        }

        let previous = self.repo.get_latest(scholar_id).await?;
        let entry = HistoryEntry::automatic(scholar_id, citation_count, at);
        let written = self.append(&entry).await?;

        self.registry
            .apply_snapshot(scholar_id, name, citation_count, entry.timestamp)
            .await?;

        Ok(ReadingOutcome { previous, written })
    }

    async fn update_count(&self, entry_id: &str, citation_count: i64) -> StoreResult<HistoryEntry> {
        if citation_count < 0 {
            return Err(StoreError::InvalidEntry(format!(
                "citation_count={}",
                citation_count
            )));
        }

        let mut entry = self
            .repo
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(entry_id.to_string()))?;

        self.repo
            .update_citation_count(entry_id, citation_count)
            .await?;
        entry.citation_count = citation_count;

        // 修改的是最新记录时同步快照
        let latest = self.repo.get_latest(&entry.scholar_id).await?;
        if latest.as_ref().map(|l| l.id.as_str()) == Some(entry.id.as_str()) {
            self.registry
                .apply_snapshot(&entry.scholar_id, None, citation_count, entry.timestamp)
                .await?;
        }

        tracing::info!(
            "修复记录 {}: 引用数改为 {}",
            entry_id,
            citation_count
        );
        Ok(entry)
    }

    async fn restore_to_point(&self, scholar_id: &str, point: &HistoryEntry) -> StoreResult<u64> {
        if point.scholar_id != scholar_id {
            return Err(StoreError::NotFound(format!(
                "记录 {} 不属于学者 {}",
                point.id, scholar_id
            )));
        }

        let deleted = self.repo.delete_after(scholar_id, point.timestamp).await?;
        self.registry
            .apply_snapshot(scholar_id, None, point.citation_count, point.timestamp)
            .await?;

        tracing::info!(
            "学者 {} 已恢复到 {}，删除了 {} 条之后的记录",
            scholar_id,
            point.timestamp,
            deleted
        );
        Ok(deleted)
    }

    async fn remove_scholar(&self, scholar_id: &str) -> StoreResult<Option<ScholarRecord>> {
        self.repo.delete_by_scholar(scholar_id).await?;
        self.registry.remove(scholar_id).await
    }
}

/// Store Writer Handle
#[derive(Clone)]
pub struct StoreWriterHandle {
    sender: mpsc::Sender<WriterCommand>,
}

impl StoreWriterHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StoreResult<T>>) -> WriterCommand,
    ) -> StoreResult<T> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }

    pub async fn append(&self, entry: HistoryEntry) -> StoreResult<bool> {
        self.call(|reply| WriterCommand::Append { entry, reply }).await
    }

    pub async fn record_reading(
        &self,
        scholar_id: String,
        name: Option<String>,
        citation_count: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<ReadingOutcome> {
        self.call(|reply| WriterCommand::RecordReading {
            scholar_id,
            name,
            citation_count,
            at,
            reply,
        })
        .await
    }

    pub async fn update_count(&self, entry_id: String, citation_count: i64) -> StoreResult<HistoryEntry> {
        self.call(|reply| WriterCommand::UpdateCount {
            entry_id,
            citation_count,
            reply,
        })
        .await
    }

    pub async fn delete_all(&self, scholar_id: String) -> StoreResult<u64> {
        self.call(|reply| WriterCommand::DeleteAll { scholar_id, reply })
            .await
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.call(|reply| WriterCommand::DeleteOlderThan { cutoff, reply })
            .await
    }

    pub async fn delete_many(&self, ids: Vec<String>) -> StoreResult<u64> {
        self.call(|reply| WriterCommand::DeleteMany { ids, reply })
            .await
    }

    pub async fn restore_to_point(&self, scholar_id: String, point: HistoryEntry) -> StoreResult<u64> {
        self.call(|reply| WriterCommand::RestoreToPoint {
            scholar_id,
            point,
            reply,
        })
        .await
    }

    pub async fn remove_scholar(&self, scholar_id: String) -> StoreResult<Option<ScholarRecord>> {
        self.call(|reply| WriterCommand::RemoveScholar { scholar_id, reply })
            .await
    }
}
