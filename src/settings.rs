use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{AppSettings, SettingsUpdate};

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<AppSettings>(&bytes)
                .unwrap_or_else(|e| {
                    tracing::warn!("配置文件解析失败，使用默认配置: {}", e);
                    AppSettings::default()
                }),
            _ => {
                let default = AppSettings::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> AppSettings {
        self.data.read().await.clone()
    }

    /// 应用部分更新；校验失败或写盘失败时内存中的配置保持不变
    pub async fn update(&self, update: SettingsUpdate) -> Result<AppSettings> {
        let mut guard = self.data.write().await;
        let mut settings = guard.clone();

        if let Some(interval) = update.update_interval {
            settings.update_interval = interval;
        }
        if let Some(notification) = update.notification {
            settings.notification = notification;
        }
        if let Some(retry) = update.retry {
            settings.retry = retry;
        }
        if let Some(value) = update.min_request_interval_ms {
            settings.min_request_interval_ms = value;
        }
        if let Some(days) = update.retention_days {
            if days < 1 {
                return Err(anyhow::anyhow!("保留天数必须至少为1天"));
            }
            settings.retention_days = days;
        }
        if let Some(enabled) = update.auto_cleanup_enabled {
            settings.auto_cleanup_enabled = enabled;
        }

        self.save(&settings).await?;
        *guard = settings.clone();
        Ok(settings)
    }

    /// 记录最近一次完成同步的时间
    pub async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        let mut settings = self.data.write().await;
        settings.last_sync_time = Some(at);
        self.save(&settings).await
    }

    async fn save(&self, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateInterval;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_defaults_written_on_first_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let manager = SettingsManager::new(path.clone()).await.unwrap();

        assert_eq!(manager.get().await, AppSettings::default());
        assert!(path.exists(), "首次运行应写入默认配置");
    }

    #[tokio::test]
    async fn test_partial_update_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let manager = SettingsManager::new(path.clone()).await.unwrap();

        let updated = manager
            .update(SettingsUpdate {
                update_interval: Some(UpdateInterval::SixHours),
                retention_days: Some(30),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.update_interval, UpdateInterval::SixHours);
        assert_eq!(updated.notification.threshold, 5, "未提供的字段保持不变");

        let at = Utc::now();
        manager.set_last_sync_time(at).await.unwrap();

        let reopened = SettingsManager::new(path).await.unwrap();
        let settings = reopened.get().await;
        assert_eq!(settings.retention_days, 30);
        assert_eq!(settings.last_sync_time, Some(at));
    }

    #[tokio::test]
    async fn test_invalid_retention_rejected() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().join("s.json")).await.unwrap();
        let result = manager
            .update(SettingsUpdate {
                retention_days: Some(0),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_other_fields_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        let manager = SettingsManager::new(path.clone()).await.unwrap();

        let result = manager
            .update(SettingsUpdate {
                update_interval: Some(UpdateInterval::OneWeek),
                retention_days: Some(0),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.get().await, AppSettings::default());

        let reopened = SettingsManager::new(path).await.unwrap();
        assert_eq!(reopened.get().await, AppSettings::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, b"[1, 2").await.unwrap();

        let manager = SettingsManager::new(path).await.unwrap();
        assert_eq!(manager.get().await, AppSettings::default());
    }
}
