// 变化检测与通知策略

pub mod detector;
pub mod notifier;

pub use detector::ChangeDetector;
pub use notifier::{ChangeNotifier, MAX_RECENT};
