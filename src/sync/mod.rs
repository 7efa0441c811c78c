// 同步模块 - 定时/按需刷新学者引用数

pub mod cancel;
pub mod orchestrator;
pub mod scheduler;

pub use cancel::{CancelHandle, CancelToken};
pub use orchestrator::SyncOrchestrator;
pub use scheduler::SyncScheduler;
