// 存储配置定义

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 存储配置，所有数据文件都落在同一个数据目录下
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 数据目录
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// SQLite 历史数据库
    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    /// 学者列表（有序 JSON 数组）
    pub fn scholars_path(&self) -> PathBuf {
        self.data_dir.join("scholars.json")
    }

    /// 应用设置
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(default_data_dir())
    }
}

/// 按平台获取默认数据目录
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Application Support/citetrack")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("citetrack")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local/share/citetrack")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_data_dir() {
        let config = StorageConfig::new("/tmp/citetrack-test");
        assert_eq!(
            config.history_db_path(),
            PathBuf::from("/tmp/citetrack-test/history.db")
        );
        assert_eq!(config.scholars_path().parent(), Some(config.data_dir.as_path()));
    }
}
