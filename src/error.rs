// 领域错误类型定义
//
// 抓取、存储、导入三条链路各自返回带类型的错误，调用方按类型决定是否重试或降级

use thiserror::Error;

/// 学者主页抓取错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// 学者ID格式非法
    #[error("无效的学者ID: {0}")]
    InvalidIdentifier(String),
    /// 响应为空
    #[error("未收到数据")]
    NoData,
    /// 页面结构无法解析
    #[error("页面解析失败")]
    Parse,
    /// 网络错误（可重试）
    #[error("网络错误: {0}")]
    Network(String),
}

impl FetchError {
    /// 是否值得重试：只有网络错误和空响应是暂时性的
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::NoData)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}

/// 历史数据存储错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// 存储引擎不可用
    #[error("存储不可用")]
    Unavailable,
    #[error("数据库错误: {0}")]
    Database(String),
    #[error("记录不存在: {0}")]
    NotFound(String),
    /// 引用数为负或学者ID为空
    #[error("无效的历史记录: {0}")]
    InvalidEntry(String),
    /// 学者已在跟踪列表中
    #[error("学者已存在: {0}")]
    Duplicate(String),
    #[error("IO错误: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        Self::Database(value.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// 导入错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    /// 三种已知格式都不匹配
    #[error("无法识别的导入格式")]
    UnrecognizedFormat,
    #[error("JSON 解析失败: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 单个学者刷新的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// 学者不在跟踪列表中
    #[error("未跟踪的学者: {0}")]
    UnknownScholar(String),
    /// 刷新已被取消，结果被丢弃
    #[error("刷新已取消")]
    Cancelled,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 门面层错误，汇总各条链路的错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("配置错误: {0}")]
    Settings(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchError::Network("timeout".into()).is_retryable());
        assert!(FetchError::NoData.is_retryable());
        assert!(!FetchError::Parse.is_retryable());
        assert!(!FetchError::InvalidIdentifier("x y".into()).is_retryable());
    }
}
