// 存储模块 - 学者列表与引用历史

// 子模块
pub mod cleaner;
pub mod config;
pub mod history;
pub mod models;
pub mod registry;
pub mod repository;
pub mod writer;

// 重新导出主要类型
pub use cleaner::HistoryCleaner;
pub use config::{default_data_dir, StorageConfig};
pub use history::HistoryStore;
pub use models::*;
pub use registry::ScholarRegistry;
pub use repository::sqlite::SqliteHistoryRepository;
pub use repository::HistoryRepository;
pub use writer::ReadingOutcome;
