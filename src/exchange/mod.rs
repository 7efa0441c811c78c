// 数据导入导出模块
//
// 导出：扁平数组或包装格式的 JSON
// 导入：识别三种形状之一，学者按ID合并，读数统一经 HistoryStore::append 写入

pub mod export;
pub mod format;
pub mod import;

use crate::storage::{HistoryStore, ScholarRegistry};
use std::sync::Arc;

pub use format::{detect_payload, ExportEntry, ExportShape, ImportPayload, WrappedExport};
pub use import::ImportOutcome;

/// 导入导出协调器
#[derive(Clone)]
pub struct Reconciler {
    store: HistoryStore,
    registry: Arc<ScholarRegistry>,
}

impl Reconciler {
    pub fn new(store: HistoryStore, registry: Arc<ScholarRegistry>) -> Self {
        Self { store, registry }
    }
}
