// 学术引用跟踪引擎 - 主库

// 声明模块
pub mod app;
pub mod error;
pub mod event_bus;
pub mod exchange;
pub mod logger;
pub mod models;
pub mod notify;
pub mod scholar;
pub mod settings;
pub mod storage;
pub mod sync;

pub use app::{run, CiteTrack};
pub use error::{AppError, FetchError, ImportError, StoreError, SyncError};
